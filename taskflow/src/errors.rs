//! Error types for the taskflow graph.

use thiserror::Error;

/// The main error type for taskflow operations.
///
/// Errors are cloneable so catch hooks can observe a failure without taking
/// ownership of it away from other handlers on the same node.
#[derive(Debug, Clone, Error)]
pub enum TaskflowError {
    /// Joined branches do not share a compatible key origin.
    ///
    /// Auto-generated key namespaces (fork counters, data indices) from
    /// different ancestors cannot be correlated; only branches sharing one
    /// origin, or branches that are all user-keyed, may join.
    #[error("cannot join contexts with different key origins")]
    JoinKeyOrigin,

    /// A remote call could not be executed, or its body was not JSON.
    #[error("transport error for {url}: {message}")]
    Transport {
        /// The request URL.
        url: String,
        /// Description of the underlying failure.
        message: String,
    },

    /// The one-time authentication exchange failed.
    #[error("authentication against {url} failed: {message}")]
    Auth {
        /// The token endpoint URL.
        url: String,
        /// Description of the underlying failure.
        message: String,
    },

    /// An operation name was not present in the registry.
    #[error("unknown operation '{name}'")]
    UnknownOperation {
        /// The requested operation name.
        name: String,
    },

    /// A remote call was dispatched from a branch with no server connection.
    #[error("no server connection configured for this branch")]
    NoConnection,

    /// A response envelope did not match the protocol contract.
    #[error("malformed response envelope: {message}")]
    Protocol {
        /// Description of the mismatch.
        message: String,
    },

    /// The branch aborted before delivering a pending completion signal.
    #[error("pipeline branch aborted before completing")]
    BranchAborted,
}

impl TaskflowError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn auth(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TaskflowError::transport("https://example.org/traits", "connection refused");
        assert_eq!(
            err.to_string(),
            "transport error for https://example.org/traits: connection refused"
        );
    }

    #[test]
    fn test_join_origin_error_display() {
        let err = TaskflowError::JoinKeyOrigin;
        assert!(err.to_string().contains("different key origins"));
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = TaskflowError::UnknownOperation {
            name: "search".to_string(),
        };
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
