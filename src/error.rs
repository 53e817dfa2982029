//! Error taxonomy
//!
//! Decode failures are recovered locally: the sender gets an error envelope
//! and the connection stays open. Transport failures are fatal to that one
//! connection: force-terminate and run the disconnection path, never retried.
//! No error is fatal to the process.

use thiserror::Error;

/// Failures while turning raw frames into envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes are not parseable JSON.
    #[error("Invalid JSON format")]
    MalformedPayload,

    /// The parsed payload lacks a string `type` discriminant.
    #[error("Missing message type")]
    MissingKind,

    /// The caller-supplied validator rejected the payload.
    #[error("Invalid message")]
    ValidationRejected,
}

/// Failures on the transport collaborator. Each one escalates to eviction
/// of the affected connection.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("ping failed: {0}")]
    PingFailed(String),
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for socket operations.
pub type SocketResult<T> = Result<T, SocketError>;
