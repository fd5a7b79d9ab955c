//! Generation backend client (Ollama `/api/generate`)
//!
//! The HTTP client is built once when the service starts and shared by every
//! request; no call is retried.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::config::OnrampConfig;
use crate::error::{OnrampError, OnrampResult};

/// Raw response body of a streaming generation.
pub type ByteStream = Pin<Box<dyn Stream<Item = OnrampResult<Bytes>> + Send>>;

/// Decoded text fragments of a streaming generation.
pub type TextStream = Pin<Box<dyn Stream<Item = OnrampResult<String>> + Send>>;

/// Produces prose from a prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// One prompt in, one completion out.
    async fn generate(&self, prompt: &str) -> OnrampResult<String>;

    /// Same request, returning the response body as it arrives.
    async fn generate_stream(&self, prompt: &str) -> OnrampResult<ByteStream>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Decode a newline-delimited JSON generation stream into text fragments.
///
/// Lines may be split across chunks. Lines without text (such as the final
/// `done` record) are skipped; a malformed line or a transport error ends the
/// stream after yielding the error.
pub fn decode_ndjson(bytes: ByteStream) -> TextStream {
    let state = (bytes, Vec::<u8>::new(), false);
    Box::pin(futures::stream::unfold(
        state,
        |(mut bytes, mut buf, mut finished)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    match decode_line(&line) {
                        Some(Ok(text)) => return Some((Ok(text), (bytes, buf, finished))),
                        Some(Err(e)) => return Some((Err(e), (bytes, Vec::new(), true))),
                        None => continue,
                    }
                }
                if finished {
                    let rest = std::mem::take(&mut buf);
                    return decode_line(&rest).map(|item| (item, (bytes, buf, true)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(e), (bytes, Vec::new(), true))),
                    None => finished = true,
                }
            }
        },
    ))
}

fn decode_line(line: &[u8]) -> Option<OnrampResult<String>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice::<GenerateResponse>(line) {
        Ok(chunk) if chunk.response.is_empty() => None,
        Ok(chunk) => Some(Ok(chunk.response)),
        Err(e) => Some(Err(OnrampError::upstream(format!(
            "malformed stream chunk: {e}"
        )))),
    }
}

/// Client for an Ollama-compatible generation endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> OnrampResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OnrampError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.into(),
            timeout,
        })
    }

    pub fn from_config(config: &OnrampConfig) -> OnrampResult<Self> {
        Self::new(
            &config.generation_url,
            config.generation_model.clone(),
            config.generation_timeout(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, prompt: &str, stream: bool) -> OnrampResult<reqwest::Response> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, endpoint = %self.endpoint, "Generation backend returned an error");
            return Err(OnrampError::upstream(format!("backend error ({status}): {body}")));
        }
        Ok(response)
    }

    fn transport_error(&self, e: reqwest::Error) -> OnrampError {
        tracing::error!(endpoint = %self.endpoint, error = %e, "Generation request failed");
        if e.is_timeout() {
            OnrampError::upstream(format!(
                "request timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            OnrampError::upstream(format!("HTTP request failed: {e}"))
        }
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> OnrampResult<String> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Sending generation request");
        let response = self.send(prompt, false).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(body.response.trim().to_string())
    }

    async fn generate_stream(&self, prompt: &str) -> OnrampResult<ByteStream> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Opening generation stream");
        let response = self.send(prompt, true).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| OnrampError::upstream(format!("stream interrupted: {e}"))));
        Ok(Box::pin(stream))
    }
}
