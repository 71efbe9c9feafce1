use shared::{ErrorCode, TransportError};
use thiserror::Error;

/// Why a client session stopped.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to server: {0}")]
    Connect(#[source] std::io::Error),

    #[error("connection lost: {0}")]
    Transport(#[from] TransportError),

    #[error("server rejected the session: {0}")]
    Rejected(ErrorCode),
}

impl ClientError {
    /// True when the user should pick another name and try again.
    pub fn is_name_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::Rejected(ErrorCode::NameTaken | ErrorCode::InvalidName)
        )
    }
}
