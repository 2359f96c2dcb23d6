//! OpenAI-compatible chat completions client.
//!
//! Works against api.openai.com and any server exposing the same
//! `/chat/completions` contract (vLLM, LM Studio, Ollama's OpenAI shim).
//! Each prompt is sent as a single user message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use docqa_core::config::LlmConfig;
use docqa_core::error::DocqaError;
use docqa_core::service::{LanguageModel, TokenStream};

use crate::sse::SseDecoder;

/// Payload marking the end of a completion stream.
const STREAM_END: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    http: Client,
}

impl OpenAiChatModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self, DocqaError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocqaError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &str, stream: bool) -> RequestBuilder {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stream,
        };
        let builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, DocqaError> {
        let res = self
            .request(prompt, stream)
            .send()
            .await
            .map_err(|e| DocqaError::Llm(format!("request failed: {}", e)))?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(DocqaError::Llm(format!("{}: {}", status, text)));
        }
        Ok(res)
    }
}

/// Error message carried in an OpenAI error payload, if any.
fn error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    Some(
        error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

/// Text delta of one streamed chunk. Chunks carrying only a role or a
/// finish reason yield `None`.
fn delta_content(payload: &Value) -> Option<&str> {
    payload
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
}

enum Chunk {
    Token(String),
    Skip,
    End,
}

fn decode_chunk(data: &str) -> Result<Chunk, DocqaError> {
    if data.trim() == STREAM_END {
        return Ok(Chunk::End);
    }
    let payload: Value = serde_json::from_str(data)
        .map_err(|e| DocqaError::Llm(format!("malformed stream chunk: {}", e)))?;
    if let Some(message) = error_message(&payload) {
        return Err(DocqaError::Llm(message));
    }
    Ok(match delta_content(&payload) {
        Some(content) => Chunk::Token(content.to_string()),
        None => Chunk::Skip,
    })
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, DocqaError> {
        debug!(model = %self.model, "Chat completion");
        let payload: Value = self
            .send(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| DocqaError::Llm(format!("invalid completion response: {}", e)))?;
        if let Some(message) = error_message(&payload) {
            return Err(DocqaError::Llm(message));
        }
        payload
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| DocqaError::Llm("completion response has no content".to_string()))
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream, DocqaError> {
        debug!(model = %self.model, "Streaming chat completion");
        let res = self.send(prompt, true).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut body = res.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            while let Some(item) = body.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(DocqaError::Llm(format!("stream interrupted: {}", e))))
                            .await;
                        return;
                    }
                };
                for data in decoder.push(&bytes) {
                    match decode_chunk(&data) {
                        Ok(Chunk::Token(token)) => {
                            if tx.send(Ok(token)).await.is_err() {
                                debug!("Token receiver dropped; abandoning completion stream");
                                return;
                            }
                        }
                        Ok(Chunk::Skip) => {}
                        Ok(Chunk::End) => return,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }
            // Body ended without a [DONE] marker.
            if let Some(data) = decoder.finish() {
                match decode_chunk(&data) {
                    Ok(Chunk::Token(token)) => {
                        let _ = tx.send(Ok(token)).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                    }
                }
            } else {
                warn!("Completion stream closed without end marker");
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
