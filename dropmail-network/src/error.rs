use crate::codec::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not connected to the node")]
    NoConnection,

    #[error("Connection with the node closed before the request completed")]
    Closed,

    #[error("A request with identifier {0} is already pending")]
    DuplicateIdentifier(String),

    #[error("Cannot submit a message without identifier")]
    MissingIdentifier,

    #[error("Unexpected reply from the node: {0}")]
    UnexpectedReply(String),

    #[error("Cannot encode the message")]
    Encode(#[source] CodecError),
}

impl SessionError {
    /// the request failed because of the state of the connection rather
    /// than because of the request itself
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::NoConnection | Self::Closed)
    }
}
