//! Error types for upstream data access

use thiserror::Error;

/// Errors raised by the Blockscout clients and the request layer
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("unsupported chain id: {0}")]
    UnsupportedChain(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("giving up after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP session is not connected")]
    NotConnected,

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("an address is required for this source")]
    AddressRequired,
}

impl ClientError {
    /// Rate limits and timeouts, the failures the request layer retries
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout(),
            ClientError::Status { status, .. } => *status == 429 || *status == 524,
            ClientError::RetriesExhausted { .. } => true,
            _ => false,
        }
    }

    /// Configuration errors must surface to the caller and are never retried
    pub fn is_configuration(&self) -> bool {
        matches!(self, ClientError::UnsupportedChain(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
