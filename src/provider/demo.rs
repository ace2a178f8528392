use async_trait::async_trait;
use std::time::Instant;

use super::{ExecutionOutcome, ExecutionRequest, Executor};

/// Offline executor used when no endpoint is configured; echoes the prompt.
pub struct Demo;

pub fn demo_response(prompt: &str) -> String {
    format!(
        "[DEMO MODE]\n\nPrompt已接收：\n{prompt}\n\n這是演示模式的回應。請設定 NOVALLM_API_URL 和 NOVALLM_API_KEY 環境變數以連接到真實的NovaLLM API。\n\n在實際環境中，這裡會顯示NovaLLM的回應內容。"
    )
}

#[async_trait]
impl Executor for Demo {
    async fn execute(&self, req: &ExecutionRequest) -> ExecutionOutcome {
        let start = Instant::now();
        let response = demo_response(&req.prompt);
        ExecutionOutcome::ok(response, start.elapsed().as_millis() as u64)
    }
}
