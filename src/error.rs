//! Error types for the plugin reconciler.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config: {0}")]
    Config(String),

    #[error("Store: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
