//! error types for the client engine

use thiserror::Error;

/// failures crossing the network or storage boundary
///
/// validation and market gating are not errors; they live in
/// [`crate::orchestrator`] as typed UI states.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("oracle request failed: {0}")]
    Oracle(String),

    #[error("oracle returned no update data")]
    EmptyUpdateData,

    #[error("chain call failed: {0}")]
    Chain(String),

    #[error("indexer query failed: {0}")]
    Indexer(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid hex payload: {0}")]
    InvalidHex(String),

    #[error("timeout waiting for {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}
