use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;

pub mod demo;
pub mod novallm;

/// A compiled prompt on its way to the inference endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ExecutionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), model: None, temperature: None, max_tokens: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ExecutionOutcome {
    pub fn ok(response: String, execution_time_ms: u64) -> Self {
        Self { success: true, response, error: None, execution_time_ms }
    }

    pub fn failed(error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self { success: false, response: String::new(), error: Some(error.into()), execution_time_ms }
    }
}

/// Remote prompt execution. Transport and API failures are reported through
/// [`ExecutionOutcome::error`], never as a panic or `Err`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, req: &ExecutionRequest) -> ExecutionOutcome;
}

pub type DynExecutor = Arc<dyn Executor>;

/// The HTTP client when an endpoint is configured, otherwise the demo echo.
pub fn make_executor(cfg: &Config) -> anyhow::Result<DynExecutor> {
    match cfg.api_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let client = novallm::NovaLlm::new(
                url.to_string(),
                cfg.api_key.clone().unwrap_or_default(),
                cfg.timeout_secs,
            )?
            .with_defaults(cfg.model.clone(), cfg.temperature, cfg.max_tokens);
            Ok(Arc::new(client))
        }
        None => {
            tracing::info!("no API URL configured; using demo executor");
            Ok(Arc::new(demo::Demo))
        }
    }
}

const OPTIMIZE_TEMPERATURE: f32 = 0.3;

pub fn optimization_prompt(original: &str) -> String {
    format!(
        "你是一位Prompt Engineering專家。請優化以下提示詞，使其更清晰、更有效：\n\n{original}\n\n請直接輸出優化後的提示詞，不要加入其他說明。"
    )
}

/// Asks the model to rewrite `original`; falls back to `original` on failure.
pub async fn optimize_prompt(executor: &dyn Executor, original: &str) -> String {
    let req = ExecutionRequest {
        temperature: Some(OPTIMIZE_TEMPERATURE),
        ..ExecutionRequest::new(optimization_prompt(original))
    };
    let outcome = executor.execute(&req).await;
    if outcome.success {
        outcome.response
    } else {
        tracing::warn!(error = ?outcome.error, "prompt optimization failed; keeping original");
        original.to_string()
    }
}
