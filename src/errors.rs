use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("snapshot error: {0}")] Snapshot(String),
    #[error("store error: {0}")] Store(String),
    #[error("config error: {0}")] Config(String),
    #[error("execution failed: {0}")] Execution(String),
}
