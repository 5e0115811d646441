//! Direct invocation of the forecast Lambda from the ask Lambda.
//!
//! When a prediction question arrives and no forecasts have been persisted
//! yet, the ask handler triggers a fresh forecast instead of answering from
//! nothing. The forecast function fronts API Gateway, so the payload is a
//! minimal proxy-shaped event and the reply is unwrapped from the proxy
//! response envelope.

use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::Client as LambdaClient;
use serde::Deserialize;
use serde_json::json;

use crate::models::PredictionRecord;
use crate::{Error, Result};

/// Result of a direct forecast invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastOutcome {
    /// Raw model answer text
    pub response: String,
    /// Whether the forecast row was persisted
    #[serde(default)]
    pub saved: bool,
    /// The parsed forecast, when the model produced one
    #[serde(default)]
    pub forecast: Option<PredictionRecord>,
}

/// Seam for triggering a forecast from another handler.
#[async_trait]
pub trait ForecastInvoker: Send + Sync {
    async fn request_forecast(&self, question: &str) -> Result<ForecastOutcome>;
}

/// Invokes the deployed forecast Lambda through the Lambda API.
pub struct ForecastClient {
    lambda_client: LambdaClient,
    function_name: String,
}

impl ForecastClient {
    pub fn new(lambda_client: LambdaClient, function_name: String) -> Self {
        Self { lambda_client, function_name }
    }
}

#[derive(Deserialize)]
struct ProxyResponse {
    #[serde(rename = "statusCode")]
    status_code: u16,
    body: String,
}

#[async_trait]
impl ForecastInvoker for ForecastClient {
    async fn request_forecast(&self, question: &str) -> Result<ForecastOutcome> {
        let event = json!({
            "httpMethod": "POST",
            "path": "/forecast",
            "headers": { "content-type": "application/json" },
            "requestContext": {},
            "isBase64Encoded": false,
            "body": serde_json::to_string(&json!({ "question": question }))?,
        });

        let response = self
            .lambda_client
            .invoke()
            .function_name(&self.function_name)
            .payload(Blob::new(serde_json::to_vec(&event)?))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("failed to invoke forecast function: {e}")))?;

        let payload = response
            .payload()
            .ok_or_else(|| Error::Internal("no payload from forecast function".to_string()))?;

        let proxy: ProxyResponse = serde_json::from_slice(payload.as_ref())
            .map_err(|e| Error::Internal(format!("unexpected forecast reply shape: {e}")))?;

        if proxy.status_code != 200 {
            return Err(Error::Internal(format!(
                "forecast function returned {}",
                proxy.status_code
            )));
        }

        serde_json::from_str(&proxy.body)
            .map_err(|e| Error::Internal(format!("unexpected forecast body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_decodes_from_forecast_body() {
        let body = r#"{
            "question": "30分後は?",
            "response": "{\"time\": \"2025/01/01 12:00\", \"num\": 42, \"reasons\": \"lunch peak\"}",
            "saved": true,
            "forecast": {"time": "2025/01/01 12:00", "num": 42, "reasons": "lunch peak"}
        }"#;
        let outcome: ForecastOutcome = serde_json::from_str(body).unwrap();
        assert!(outcome.saved);
        assert_eq!(outcome.forecast.unwrap().num, 42);
    }

    #[test]
    fn outcome_tolerates_unsaved_forecasts() {
        let body = r#"{"question": "q", "response": "no json here", "saved": false}"#;
        let outcome: ForecastOutcome = serde_json::from_str(body).unwrap();
        assert!(!outcome.saved);
        assert!(outcome.forecast.is_none());
    }
}
