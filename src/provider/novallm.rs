use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{ExecutionOutcome, ExecutionRequest, Executor};

pub const DEFAULT_MODEL: &str = "default";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// HTTP client for the NovaLLM completion endpoint.
pub struct NovaLlm {
    url: String,
    api_key: String,
    client: Client,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize, Default)]
struct CompletionResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

impl CompletionResponse {
    fn into_text(self) -> String {
        [self.response, self.text, self.output]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }
}

impl NovaLlm {
    pub fn new(url: String, api_key: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self {
            url,
            api_key,
            client,
            model: DEFAULT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Values used when a request leaves model/temperature/max_tokens unset.
    pub fn with_defaults(mut self, model: String, temperature: f32, max_tokens: u32) -> Self {
        self.model = model;
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    async fn send(&self, req: &ExecutionRequest) -> anyhow::Result<String> {
        let body = CompletionRequest {
            prompt: &req.prompt,
            model: req.model.as_deref().unwrap_or(&self.model),
            temperature: req.temperature.unwrap_or(self.temperature),
            max_tokens: req.max_tokens.unwrap_or(self.max_tokens),
        };

        tracing::debug!(url = %self.url, model = body.model, "POST completion");

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        tracing::debug!(%status, bytes = text.len(), "completion response");

        if !status.is_success() {
            anyhow::bail!(
                "API request failed: {}",
                status.canonical_reason().unwrap_or(status.as_str())
            );
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse API response: {e}"))?;
        Ok(parsed.into_text())
    }
}

#[async_trait]
impl Executor for NovaLlm {
    async fn execute(&self, req: &ExecutionRequest) -> ExecutionOutcome {
        let start = Instant::now();
        let result = self.send(req).await;
        let elapsed = start.elapsed().as_millis() as u64;
        match result {
            Ok(text) => ExecutionOutcome::ok(text, elapsed),
            Err(e) => {
                tracing::warn!(error = %e, "prompt execution failed");
                ExecutionOutcome::failed(e.to_string(), elapsed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_prefers_response_then_text_then_output() {
        let r: CompletionResponse = serde_json::from_str(r#"{"text":"b","output":"c"}"#).unwrap();
        assert_eq!(r.into_text(), "b");
        let r: CompletionResponse =
            serde_json::from_str(r#"{"response":"a","text":"b"}"#).unwrap();
        assert_eq!(r.into_text(), "a");
        let r: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(r.into_text(), "");
    }

    #[test]
    fn request_body_shape() {
        let body = CompletionRequest { prompt: "p", model: DEFAULT_MODEL, temperature: 0.7, max_tokens: 2000 };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "default");
        assert_eq!(v["max_tokens"], 2000);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_failed_outcome() {
        let client = NovaLlm::new("http://127.0.0.1:9/v1/complete".into(), "k".into(), 2).unwrap();
        let out = client.execute(&ExecutionRequest::new("hi")).await;
        assert!(!out.success);
        assert!(out.error.is_some());
        assert!(out.response.is_empty());
    }
}
