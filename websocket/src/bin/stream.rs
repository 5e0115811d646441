//! Stream Lambda - answers questions over an API Gateway WebSocket.
//!
//! `$connect` and `$disconnect` are acknowledged and logged; the
//! application route takes a question (query parameter or JSON body),
//! opens a Bedrock response stream, and posts each text fragment to the
//! connection as it arrives. Fragments are forwarded in order with no
//! buffering of the full answer; a send failure stops forwarding, and
//! fragments already delivered stay delivered.

use async_trait::async_trait;
use aws_sdk_apigatewaymanagement::primitives::Blob;
use aws_sdk_apigatewaymanagement::Client as ManagementClient;
use futures::StreamExt;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::inference::DeltaStream;
use shared::{BedrockModel, InvokeOptions, TextModel, APOLOGY};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// API Gateway WebSocket proxy event, reduced to the fields we use.
#[derive(Debug, Deserialize)]
struct WebsocketEvent {
    #[serde(rename = "requestContext", default)]
    request_context: WebsocketRequestContext,
    #[serde(rename = "queryStringParameters", default)]
    query: Option<HashMap<String, String>>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WebsocketRequestContext {
    #[serde(rename = "routeKey", default)]
    route_key: String,
    #[serde(rename = "connectionId", default)]
    connection_id: String,
    #[serde(rename = "domainName", default)]
    domain_name: String,
    #[serde(default)]
    stage: String,
}

#[derive(Debug, Serialize)]
struct WebsocketResponse {
    #[serde(rename = "statusCode")]
    status_code: u16,
    body: String,
}

impl WebsocketResponse {
    fn new(status_code: u16, body: &str) -> Self {
        Self { status_code, body: body.to_string() }
    }
}

/// Destination for streamed text fragments.
#[async_trait]
trait ChunkSink: Send + Sync {
    async fn send(&self, text: &str) -> shared::Result<()>;
}

/// Posts fragments to the WebSocket connection through the management API.
struct ConnectionSink {
    client: ManagementClient,
    connection_id: String,
}

#[async_trait]
impl ChunkSink for ConnectionSink {
    async fn send(&self, text: &str) -> shared::Result<()> {
        let payload = serde_json::to_vec(&json!({ "text": text }))?;
        self.client
            .post_to_connection()
            .connection_id(&self.connection_id)
            .data(Blob::new(payload))
            .send()
            .await
            .map_err(|e| shared::Error::Internal(format!("post_to_connection failed: {e}")))?;
        Ok(())
    }
}

/// Forward every fragment to the sink in arrival order.
///
/// An upstream stream error degrades to a final apology fragment; a sink
/// error aborts and surfaces, since the connection is gone. Returns the
/// concatenation of everything forwarded.
async fn forward_stream(mut stream: DeltaStream, sink: &dyn ChunkSink) -> shared::Result<String> {
    let mut delivered = String::new();

    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(text) => {
                sink.send(&text).await?;
                delivered.push_str(&text);
            }
            Err(e) => {
                warn!(error = %e, "model stream failed mid-answer");
                sink.send(APOLOGY).await?;
                delivered.push_str(APOLOGY);
                break;
            }
        }
    }

    Ok(delivered)
}

/// Question extraction: query parameter first, JSON body as fallback.
fn extract_question(event: &WebsocketEvent) -> Option<String> {
    let from_query = event
        .query
        .as_ref()
        .and_then(|params| params.get("question"))
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());
    if from_query.is_some() {
        return from_query;
    }

    let body = event.body.as_deref()?;
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    parsed
        .get("question")
        .and_then(|q| q.as_str())
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
}

struct AppState {
    model: BedrockModel,
    aws_config: aws_config::SdkConfig,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        // This handler only talks to Bedrock; no backend configuration needed.
        let model_id = std::env::var("BEDROCK_MODEL_ID")
            .unwrap_or_else(|_| shared::config::DEFAULT_MODEL_ID.to_string());
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        Ok(Self {
            model: BedrockModel::new(aws_sdk_bedrockruntime::Client::new(&aws_config), model_id),
            aws_config,
        })
    }

    /// The management endpoint is per-API and per-stage, so the client is
    /// built from the event rather than at cold start.
    fn management_client(&self, context: &WebsocketRequestContext) -> ManagementClient {
        let endpoint = format!("https://{}/{}", context.domain_name, context.stage);
        let config = aws_sdk_apigatewaymanagement::config::Builder::from(&self.aws_config)
            .endpoint_url(endpoint)
            .build();
        ManagementClient::from_conf(config)
    }
}

async fn handler(
    state: Arc<AppState>,
    event: LambdaEvent<WebsocketEvent>,
) -> Result<WebsocketResponse, Error> {
    let event = event.payload;
    let context = &event.request_context;

    match context.route_key.as_str() {
        "$connect" => {
            info!(connection = %context.connection_id, "client connected");
            return Ok(WebsocketResponse::new(200, "Connected"));
        }
        "$disconnect" => {
            info!(connection = %context.connection_id, "client disconnected");
            return Ok(WebsocketResponse::new(200, "Disconnected"));
        }
        _ => {}
    }

    let question = match extract_question(&event) {
        Some(question) => question,
        None => return Ok(WebsocketResponse::new(400, "Invalid request, no question provided")),
    };

    info!(connection = %context.connection_id, question = %question, "streaming answer");

    let stream = match state.model.generate_stream(&question, InvokeOptions::STREAM).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "could not open model stream");
            return Ok(WebsocketResponse::new(500, "Failed to get response"));
        }
    };

    let sink = ConnectionSink {
        client: state.management_client(context),
        connection_id: context.connection_id.clone(),
    };

    match forward_stream(stream, &sink).await {
        Ok(_) => Ok(WebsocketResponse::new(200, "Message sent")),
        Err(e) => {
            error!(connection = %context.connection_id, error = %e, "send failed mid-stream");
            Ok(WebsocketResponse::new(500, "Failed to get response"))
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        sent: Mutex<Vec<String>>,
        fail_after: Option<usize>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail_after: None }
        }

        fn failing_after(count: usize) -> Self {
            Self { sent: Mutex::new(Vec::new()), fail_after: Some(count) }
        }
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn send(&self, text: &str) -> shared::Result<()> {
            let mut sent = self.sent.lock().unwrap();
            if let Some(limit) = self.fail_after {
                if sent.len() >= limit {
                    return Err(shared::Error::Internal("connection gone".to_string()));
                }
            }
            sent.push(text.to_string());
            Ok(())
        }
    }

    fn delta_stream(fragments: Vec<shared::Result<&'static str>>) -> DeltaStream {
        futures::stream::iter(fragments.into_iter().map(|f| f.map(String::from))).boxed()
    }

    #[tokio::test]
    async fn fragments_are_forwarded_in_order_without_loss() {
        let sink = RecordingSink::new();
        let stream = delta_stream(vec![Ok("Hel"), Ok("lo"), Ok(" world")]);

        let delivered = forward_stream(stream, &sink).await.unwrap();
        assert_eq!(delivered, "Hello world");
        assert_eq!(*sink.sent.lock().unwrap(), vec!["Hel", "lo", " world"]);
    }

    #[tokio::test]
    async fn upstream_error_degrades_to_apology_fragment() {
        let sink = RecordingSink::new();
        let stream = delta_stream(vec![
            Ok("Hel"),
            Err(shared::Error::Inference("stream cut".to_string())),
            Ok("never sent"),
        ]);

        let delivered = forward_stream(stream, &sink).await.unwrap();
        assert_eq!(delivered, format!("Hel{APOLOGY}"));
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn send_failure_aborts_but_keeps_delivered_fragments() {
        let sink = RecordingSink::failing_after(1);
        let stream = delta_stream(vec![Ok("Hel"), Ok("lo")]);

        let err = forward_stream(stream, &sink).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(*sink.sent.lock().unwrap(), vec!["Hel"]);
    }

    #[tokio::test]
    async fn question_comes_from_query_or_body() {
        let event: WebsocketEvent = serde_json::from_str(
            r#"{
                "requestContext": {"routeKey": "ask", "connectionId": "abc"},
                "queryStringParameters": {"question": " 今何人? "}
            }"#,
        )
        .unwrap();
        assert_eq!(extract_question(&event).as_deref(), Some("今何人?"));

        let event: WebsocketEvent = serde_json::from_str(
            r#"{
                "requestContext": {"routeKey": "ask", "connectionId": "abc"},
                "body": "{\"question\": \"who is here?\"}"
            }"#,
        )
        .unwrap();
        assert_eq!(extract_question(&event).as_deref(), Some("who is here?"));
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let event: WebsocketEvent = serde_json::from_str(
            r#"{
                "requestContext": {"routeKey": "ask", "connectionId": "abc"},
                "queryStringParameters": {"question": "   "}
            }"#,
        )
        .unwrap();
        assert!(extract_question(&event).is_none());
    }
}
