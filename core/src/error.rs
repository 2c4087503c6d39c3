use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Everything the offline queue, the local store and the remote client can fail with.
///
/// `Conflict` is never returned from the engine: a losing operation is dropped and the
/// error value only travels as far as the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("conflict on {entity} {id}: {reason}")]
    Conflict {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Transient failures the caller may retry by running another sync pass.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Protocol(_))
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = SyncError::validation("title", "must not be empty");
        assert_eq!(err.to_string(), "invalid title: must not be empty");

        let err = SyncError::Conflict {
            entity: "ingredient",
            id: "abc".to_string(),
            reason: "edited remotely".to_string(),
        };
        assert_eq!(err.to_string(), "conflict on ingredient abc: edited remotely");
    }

    #[test]
    fn test_retryable() {
        assert!(SyncError::Network("timeout".into()).is_retryable());
        assert!(SyncError::Protocol("bad json".into()).is_retryable());
        assert!(!SyncError::Storage("disk full".into()).is_retryable());
        assert!(!SyncError::validation("name", "empty").is_retryable());
    }
}
