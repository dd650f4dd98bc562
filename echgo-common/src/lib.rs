use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod results;

/// Default port the echo server binds to.
pub const DEFAULT_PORT: u16 = 4157;

/// Path of the echo endpoint on the server.
pub const ECHO_PATH: &str = "/echo";

/// Error types for echgo operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EchoError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {0}: {1}")]
    HttpError(u16, String),

    #[error("Client is not connected to {0}")]
    NotConnected(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<std::io::Error> for EchoError {
    fn from(err: std::io::Error) -> Self {
        EchoError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for EchoError {
    fn from(err: serde_json::Error) -> Self {
        EchoError::SerializationError(err.to_string())
    }
}

/// A single echo exchange on the wire, used for both requests and replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub message: String,
}

/// JSON error envelope returned by the server for all error responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Result type for echgo operations
pub type Result<T> = std::result::Result<T, EchoError>;

/// Name used to identify a process when none is configured: the host name
/// from the environment, falling back to `localhost`.
pub fn default_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
