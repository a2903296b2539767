use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Unknown chat type: {0}")]
    UnknownChatType(String),

    #[error("Unknown sync direction: {0}")]
    UnknownDirection(String),

    #[error("Unknown message side: {0}")]
    UnknownMessageSide(String),

    #[error("Unknown message status: {0}")]
    UnknownMessageStatus(String),

    #[error("Unknown chat filter: {0}")]
    UnknownChatFilter(String),
}
