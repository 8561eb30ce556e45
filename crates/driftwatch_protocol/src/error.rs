//! Protocol-level errors (decoding documents and statistics).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data type: '{0}'")]
    InvalidDataType(String),

    #[error("Unsupported schema document version {found} (expected <= {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
