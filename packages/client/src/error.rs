//! Error types for the QuickTalk client.

use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Every discovery candidate failed; one `"{url}: {reason}"` entry per candidate
    #[error("No reachable server among {} candidates: {}", .0.len(), .0.join(", "))]
    NoServerAvailable(Vec<String>),

    /// `/api/config` answered but not with a usable body
    #[error("Invalid server config from {url}: {reason}")]
    InvalidConfig { url: String, reason: String },

    /// Config lookup or socket handshake did not finish in time
    #[error("Timed out after {0} ms")]
    Timeout(u128),

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Server configuration is required but has not been resolved yet
    #[error("Server configuration has not been loaded")]
    NotConfigured,

    /// Upload endpoint answered with a non-success status
    #[error("Upload failed: HTTP {0}")]
    UploadFailed(u16),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
