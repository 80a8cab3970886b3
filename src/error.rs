//! Error types for the pub/sub layer.

use crate::long_poll::{RpcStatus, StatusCode};
use crate::types::{ChannelType, Endpoint};
use thiserror::Error;

/// Result type for pub/sub operations.
pub type Result<T> = std::result::Result<T, PubSubError>;

/// Main error type for pub/sub operations.
#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("RPC failed [{code}]: {message}")]
    Rpc { code: StatusCode, message: String },

    /// Delivered data does not match the stream it was delivered on.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Channel mismatch: session is registered for {expected}, not {got}")]
    ChannelMismatch {
        expected: ChannelType,
        got: ChannelType,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Endpoint unreachable: {0}")]
    Unreachable(Endpoint),
}

impl PubSubError {
    /// True for contract violations that must never be downgraded to a warning.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, PubSubError::ProtocolViolation(_) | PubSubError::InvalidKey(_))
    }
}

impl From<RpcStatus> for PubSubError {
    fn from(status: RpcStatus) -> Self {
        PubSubError::Rpc {
            code: status.code,
            message: status.message,
        }
    }
}
