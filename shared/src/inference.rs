//! Bedrock inference client (Anthropic messages protocol).

use async_trait::async_trait;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::ResponseStream;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Fixed answer returned to callers when inference fails. Upstream failures
/// are degraded to this string rather than surfaced as HTTP errors.
pub const APOLOGY: &str = "Sorry, there was an error processing your question.";

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Per-call sampling options.
#[derive(Debug, Clone, Copy)]
pub struct InvokeOptions {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl InvokeOptions {
    /// Question answering: short answers, mild sampling.
    pub const ASK: Self = Self { max_tokens: 300, temperature: Some(0.5) };
    /// Forecast generation: room for the JSON object, provider-default temperature.
    pub const FORECAST: Self = Self { max_tokens: 2000, temperature: None };
    /// WebSocket streaming.
    pub const STREAM: Self = Self { max_tokens: 512, temperature: Some(0.5) };
}

/// Ordered text fragments produced by a streaming call.
pub type DeltaStream = BoxStream<'static, Result<String>>;

/// Inference seam: blocking and streaming text generation.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Invoke the model and return the full answer text.
    async fn generate(&self, prompt: &str, options: InvokeOptions) -> Result<String>;

    /// Invoke the model and return its answer as a stream of text deltas.
    async fn generate_stream(&self, prompt: &str, options: InvokeOptions) -> Result<DeltaStream>;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

fn request_body(prompt: &str, options: InvokeOptions) -> Result<Blob> {
    let request = MessagesRequest {
        anthropic_version: ANTHROPIC_VERSION,
        max_tokens: options.max_tokens,
        temperature: options.temperature,
        messages: [Message { role: "user", content: prompt }],
    };
    Ok(Blob::new(serde_json::to_vec(&request)?))
}

/// Pull the delta text out of one streamed chunk, if it carries any.
fn delta_text(bytes: &[u8]) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_slice(bytes).ok()?;
    if chunk.kind != "content_block_delta" {
        return None;
    }
    chunk.delta?.text.filter(|text| !text.is_empty())
}

/// Bedrock-backed [`TextModel`]. One instance lives for the process lifetime.
pub struct BedrockModel {
    client: BedrockClient,
    model_id: String,
}

impl BedrockModel {
    pub fn new(client: BedrockClient, model_id: impl Into<String>) -> Self {
        Self { client, model_id: model_id.into() }
    }
}

#[async_trait]
impl TextModel for BedrockModel {
    async fn generate(&self, prompt: &str, options: InvokeOptions) -> Result<String> {
        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .body(request_body(prompt, options)?)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("invoke_model failed: {e}")))?;

        let body: MessagesResponse = serde_json::from_slice(response.body().as_ref())?;
        body.content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| Error::Inference("response carried no text content".to_string()))
    }

    async fn generate_stream(&self, prompt: &str, options: InvokeOptions) -> Result<DeltaStream> {
        let output = self
            .client
            .invoke_model_with_response_stream()
            .model_id(&self.model_id)
            .content_type("application/json")
            .body(request_body(prompt, options)?)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("invoke_model_with_response_stream failed: {e}")))?;

        let stream = futures::stream::unfold(output.body, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(Some(ResponseStream::Chunk(part))) => {
                        if let Some(text) = part.bytes().and_then(|b| delta_text(b.as_ref())) {
                            return Some((Ok(text), receiver));
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => return None,
                    Err(e) => {
                        return Some((
                            Err(Error::Inference(format!("response stream failed: {e}"))),
                            receiver,
                        ))
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
