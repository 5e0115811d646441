//! The ask pipeline: validate → fetch → select → assemble → invoke.
//!
//! Kept free of HTTP types so ordering guarantees (validation before any
//! fetch, 404 before any inference call) are testable against mock clients.

use tracing::{info, warn};

use crate::backend::{self, fetch_context, require, Backend, ContextRequest};
use crate::inference::{InvokeOptions, TextModel, APOLOGY};
use crate::intent::{self, Intent};
use crate::invoker::ForecastInvoker;
use crate::prompt::{self, sources};
use crate::{Error, Result};

/// A completed question/answer exchange.
#[derive(Debug)]
pub struct Answer {
    pub question: String,
    pub response: String,
}

/// Context reads issued for every ask invocation. The first four are
/// required; persisted forecasts and last week's counts are best-effort.
fn ask_requests() -> Vec<ContextRequest> {
    vec![
        ContextRequest::new(sources::SUSPICIOUS, backend::procedures::SUSPICIOUS),
        ContextRequest::new(sources::ENTRY_EXIT, backend::procedures::ENTRY_EXIT),
        ContextRequest::new(sources::EXTREMES, backend::procedures::MAX_MIN),
        ContextRequest::new(sources::CURRENT, backend::procedures::CURRENT),
        ContextRequest::new(sources::PREDICTIONS, backend::procedures::PREDICTIONS),
        ContextRequest::new(sources::LAST_WEEK, backend::procedures::LAST_WEEK),
    ]
}

/// Answer a user question from backend context.
///
/// Returns `Error::Validation` for an unusable question and
/// `Error::NotFound` when a required context source is empty, both before
/// the model is ever invoked. Inference failures degrade to the fixed
/// apology answer rather than an error.
pub async fn answer_question(
    backend: &dyn Backend,
    model: &dyn TextModel,
    forecaster: Option<&dyn ForecastInvoker>,
    question: &str,
) -> Result<Answer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::Validation("No question provided.".to_string()));
    }

    let intent = intent::classify(question);
    info!(?intent, "classified question");

    let mut context = fetch_context(backend, ask_requests()).await;

    for name in [
        sources::SUSPICIOUS,
        sources::ENTRY_EXIT,
        sources::EXTREMES,
        sources::CURRENT,
    ] {
        require(&context, name)?;
    }

    // A prediction question with no persisted forecasts triggers a fresh
    // one through the forecast function; failure leaves the section absent.
    if intent == Intent::Prediction && require(&context, sources::PREDICTIONS).is_err() {
        if let Some(forecaster) = forecaster {
            match forecaster.request_forecast(question).await {
                Ok(outcome) => {
                    if let Some(record) = outcome.forecast {
                        let row = serde_json::to_value(&record)?;
                        context.insert(sources::PREDICTIONS.to_string(), Some(vec![row]));
                    }
                }
                Err(e) => warn!(error = %e, "forecast invocation failed"),
            }
        }
    }

    let prompt = prompt::question_prompt(question, intent, &context);
    let response = match model.generate(&prompt, InvokeOptions::ASK).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "inference failed");
            APOLOGY.to_string()
        }
    };

    Ok(Answer {
        question: question.to_string(),
        response,
    })
}

/// Rows making up the forecast context (Stage A inputs).
pub fn forecast_requests() -> Vec<ContextRequest> {
    vec![
        ContextRequest::new(sources::HOURLY, backend::procedures::HOUR_DATA)
            .with_params(serde_json::json!({ "hours_interval": 1 })),
        ContextRequest::new(sources::WEATHER, backend::procedures::WEATHER)
            .with_params(serde_json::json!({ "num_days": 1 })),
        ContextRequest::new(sources::ZONES, backend::procedures::ZONES),
    ]
}

/// Outcome of one forecast generation (Stage A).
#[derive(Debug)]
pub struct ForecastResult {
    pub question: String,
    /// Raw model answer, returned to the caller whether or not it parsed
    pub response: String,
    /// Whether a prediction row was written
    pub saved: bool,
    pub forecast: Option<crate::models::PredictionRecord>,
}

/// Generate a forecast and persist it when the model answer parses.
///
/// A malformed answer never fails the call: the raw text comes back with
/// `saved == false` and nothing is written. An insert failure is also
/// reported through `saved` rather than an error status.
pub async fn generate_forecast(
    backend: &dyn Backend,
    model: &dyn TextModel,
    question: &str,
    document: Option<&str>,
) -> Result<ForecastResult> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::Validation("No question provided.".to_string()));
    }

    let context = fetch_context(backend, forecast_requests()).await;
    for name in [sources::HOURLY, sources::WEATHER, sources::ZONES] {
        require(&context, name)?;
    }

    let prompt = prompt::forecast_prompt(question, &context, document);
    let response = match model.generate(&prompt, InvokeOptions::FORECAST).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "inference failed");
            return Ok(ForecastResult {
                question: question.to_string(),
                response: APOLOGY.to_string(),
                saved: false,
                forecast: None,
            });
        }
    };

    let (saved, forecast) = match crate::forecast::parse_forecast(&response) {
        Ok(record) => {
            let row = serde_json::to_value(&record)?;
            let saved = match backend.insert(crate::backend::PREDICTION_TABLE, &row).await {
                Ok(()) => {
                    info!(time = %record.time, num = record.num, "forecast persisted");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "forecast insert failed");
                    false
                }
            };
            (saved, Some(record))
        }
        Err(e) => {
            warn!(error = %e, "model answer did not contain a usable forecast");
            (false, None)
        }
    };

    Ok(ForecastResult {
        question: question.to_string(),
        response,
        saved,
        forecast,
    })
}
