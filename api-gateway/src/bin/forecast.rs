//! Forecast Lambda - generates and persists occupancy forecasts.
//!
//! Fetches short-horizon occupancy history, the weather forecast, zone
//! metadata, and the campus schedule document; asks the model for a JSON
//! `{time, num, reasons}` forecast; persists the parsed forecast as a
//! prediction row. The raw model answer is always returned with 200 — the
//! `saved` field tells the caller whether a row was written.

use lambda_http::http::Method;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{error_response, json_response, preflight_response};
use shared::parse_body;
use shared::{
    generate_forecast, BedrockModel, Config, ForecastResponse, QuestionRequest, SupabaseClient,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state shared across requests.
struct AppState {
    backend: SupabaseClient,
    model: BedrockModel,
    http: reqwest::Client,
    schedule_doc_url: Option<String>,
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
            http: reqwest::Client::new(),
            schedule_doc_url: config.schedule_doc_url.clone(),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    if event.method() == Method::OPTIONS {
        return preflight_response();
    }

    let request: QuestionRequest = parse_body!(event.body());

    info!(question = %request.question, "generating forecast");

    let document = match &state.schedule_doc_url {
        Some(url) => shared::documents::fetch_document(&state.http, url).await,
        None => None,
    };

    match generate_forecast(
        &state.backend,
        &state.model,
        &request.question,
        document.as_deref(),
    )
    .await
    {
        Ok(result) => json_response(
            200,
            &ForecastResponse {
                question: result.question,
                response: result.response,
                saved: result.saved,
                forecast: result.forecast,
            },
        ),
        Err(e) => {
            error!(error = %e, "forecast pipeline failed");
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
