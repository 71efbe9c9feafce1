//! Error types for the wire protocol and line transport

use thiserror::Error;

/// A line that could not be decoded into a message.
///
/// These are never fatal: the receiver drops the offending line and keeps
/// the connection open.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value `{value}` for field `{field}`")]
    InvalidField { field: &'static str, value: String },

    #[error("name is too long or contains a reserved separator")]
    InvalidName,
}

/// Failure of the byte stream underneath the protocol.
///
/// Always fatal for the connection it occurred on and nothing else.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}
