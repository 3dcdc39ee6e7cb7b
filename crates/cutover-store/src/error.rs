//! Error types for store access
//!
//! - [`StoreError`]: legacy/target record store failures
//! - [`StateStoreError`]: shared persistent store failures
//! - [`NotificationError`]: notification channel delivery failures

/// Errors from a legacy or target record store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("store '{store}' unavailable: {message}")]
    Unavailable { store: String, message: String },

    /// Store refused the write
    #[error("store '{store}' rejected write for {key}: {message}")]
    Rejected {
        store: String,
        key: String,
        message: String,
    },

    /// Payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation exceeded its deadline
    #[error("store '{store}' timed out after {millis}ms")]
    Timeout { store: String, millis: u64 },
}

impl StoreError {
    /// Create unavailable error
    pub fn unavailable(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create rejected error
    pub fn rejected(
        store: impl Into<String>,
        key: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            store: store.into(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors from the shared persistent state store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateStoreError {
    /// Backing store could not be reached
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// Referenced entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data could not be decoded
    #[error("corrupt state: {0}")]
    Corrupt(String),
}

/// Errors delivering an alert over the notification channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    /// Transport failed
    #[error("notification transport failed: {0}")]
    Transport(String),

    /// Receiver answered with a failure status
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
