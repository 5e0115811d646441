//! Shared data models.

use serde::{Deserialize, Serialize};

/// Question request payload (HTTP POST body).
#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

/// Answer response payload.
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub question: String,
    pub response: String,
}

/// Forecast response payload.
///
/// `saved` reports whether the parsed forecast was persisted; the original
/// deployment swallowed insert failures, which hid data loss from callers.
#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub question: String,
    pub response: String,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<PredictionRecord>,
}

/// A persisted occupancy forecast.
///
/// Written once by the forecast handler after a JSON-shaped model answer,
/// later read in bulk by the ask handler as historical context. There is no
/// update or delete path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Forecast timestamp, as produced by the model
    pub time: String,
    /// Predicted number of people
    pub num: i64,
    /// Free-text justification
    #[serde(default)]
    pub reasons: String,
}
