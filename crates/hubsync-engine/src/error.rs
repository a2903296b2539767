use hubsync_remote::RemoteError;
use hubsync_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A thread panicked while holding the database mutex.
    #[error("Database mutex poisoned")]
    Poisoned,

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Only messages whose send failed can be retried.
    #[error("Message {0} is not in a failed state")]
    NotRetryable(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    /// The durable lock was taken over by another run mid-pass.
    #[error("Sync lock lost by run {0}")]
    LockLost(String),
}

impl SyncError {
    /// The hub is behind an unreachable gateway. Expected and transient.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_unavailable())
    }

    /// Misconfiguration or rejected credentials; retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_fatal())
    }

    /// Turn a store `NotFound` for `chat_id` into [`SyncError::ChatNotFound`].
    pub(crate) fn chat_lookup(chat_id: &str) -> impl FnOnce(StoreError) -> SyncError + '_ {
        move |err| match err {
            StoreError::NotFound => SyncError::ChatNotFound(chat_id.to_string()),
            other => SyncError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
