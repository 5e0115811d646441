//! Ask Lambda - answers occupancy questions over HTTP.
//!
//! POST `{"question": ...}` runs the full pipeline: fetch backend context,
//! select the sources relevant to the question, assemble the prompt, invoke
//! Bedrock, and return `{"question": ..., "response": ...}`. Previously
//! persisted forecasts are included as historical context.

use lambda_http::http::Method;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{error_response, json_response, preflight_response};
use shared::parse_body;
use shared::{
    answer_question, AnswerResponse, BedrockModel, Config, ForecastClient, ForecastInvoker,
    QuestionRequest, SupabaseClient,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state shared across requests.
struct AppState {
    backend: SupabaseClient,
    model: BedrockModel,
    forecaster: ForecastClient,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        Ok(Self {
            backend: SupabaseClient::new(&config),
            model: BedrockModel::new(
                aws_sdk_bedrockruntime::Client::new(&aws_config),
                config.model_id.clone(),
            ),
            forecaster: ForecastClient::new(
                aws_sdk_lambda::Client::new(&aws_config),
                config.forecast_function.clone(),
            ),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    if event.method() == Method::OPTIONS {
        return preflight_response();
    }

    let request: QuestionRequest = parse_body!(event.body());

    info!(question = %request.question, "processing question");

    match answer_question(
        &state.backend,
        &state.model,
        Some(&state.forecaster as &dyn ForecastInvoker),
        &request.question,
    )
    .await
    {
        Ok(answer) => json_response(
            200,
            &AnswerResponse {
                question: answer.question,
                response: answer.response,
            },
        ),
        Err(e) => {
            error!(error = %e, "question pipeline failed");
            error_response(e.status_code(), e.message())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
