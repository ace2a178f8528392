use fs_err as fs;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::provider::{ExecutionOutcome, ExecutionRequest};

/// Installs the global subscriber. Logs go to stderr so stdout carries only
/// the prompt or response. `RUST_LOG` wins over the `debug` flag.
pub fn init(debug: bool) {
    let fallback = if debug { "magic_block=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .try_init();
}

pub struct SavedPaths {
    pub dir: PathBuf,
    pub request: PathBuf,
    pub response: PathBuf,
}

pub fn run_dir(store: &Path, task: Uuid) -> PathBuf {
    store.join("runs").join(task.to_string())
}

/// Writes the request/outcome pair of one execution under `<store>/runs/<task>/`.
pub fn save_run(
    store: &Path,
    task: Uuid,
    req: &ExecutionRequest,
    outcome: &ExecutionOutcome,
) -> anyhow::Result<SavedPaths> {
    let dir = run_dir(store, task);
    fs::create_dir_all(&dir)?;

    let request = dir.join("request.json");
    fs::write(&request, to_string_pretty(req)?)?;

    let response = dir.join("response.json");
    fs::write(&response, to_string_pretty(outcome)?)?;

    tracing::debug!(dir = %dir.display(), "run artifacts saved");
    Ok(SavedPaths { dir, request, response })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_run_writes_both_files() {
        let store = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let saved = save_run(
            store.path(),
            id,
            &ExecutionRequest::new("p"),
            &ExecutionOutcome::failed("timeout", 12),
        )
        .unwrap();
        assert_eq!(saved.dir, store.path().join("runs").join(id.to_string()));
        let resp: ExecutionOutcome =
            serde_json::from_str(&fs::read_to_string(&saved.response).unwrap()).unwrap();
        assert_eq!(resp.error.as_deref(), Some("timeout"));
        let req: ExecutionRequest =
            serde_json::from_str(&fs::read_to_string(&saved.request).unwrap()).unwrap();
        assert_eq!(req.prompt, "p");
    }
}
