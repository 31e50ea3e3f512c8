//! Fetch error taxonomy
//!
//! Download failures carry a typed error instead of a string so the retry
//! policy can classify them with an explicit predicate. Retryable errors
//! are the transient transport class (timeouts, resets, server-side 5xx,
//! throttling); a file that is gone or a rejected credential will not get
//! better with another attempt.

use thiserror::Error;

/// A single fetch attempt's failure mode
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The attempt exceeded its wall-clock budget
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was refused
    #[error("connection failed: {0}")]
    Connect(String),

    /// The remote answered with a non-success HTTP status
    #[error("remote returned HTTP {0}")]
    Status(u16),

    /// The remote file no longer exists (404/410)
    #[error("remote file no longer exists")]
    Gone,

    /// Authentication or authorization was rejected (401/403)
    #[error("authentication rejected by remote")]
    Unauthorized,

    /// The transfer broke mid-stream (reset, short body)
    #[error("transfer interrupted: {0}")]
    Interrupted(String),

    /// Local disk error while persisting the bytes
    #[error("local i/o error: {0}")]
    Io(String),
}

impl FetchError {
    /// Whether another attempt has a chance of succeeding
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Connect(_) | FetchError::Interrupted(_) => true,
            FetchError::Status(code) => *code == 429 || *code >= 500,
            FetchError::Gone | FetchError::Unauthorized | FetchError::Io(_) => false,
        }
    }

    /// Map an HTTP status code onto the taxonomy
    pub fn from_status(code: u16) -> Self {
        match code {
            401 | 403 => FetchError::Unauthorized,
            404 | 410 => FetchError::Gone,
            other => FetchError::Status(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Connect("refused".into()).is_retryable());
        assert!(FetchError::Interrupted("reset by peer".into()).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(FetchError::Status(429).is_retryable());
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        assert!(!FetchError::Gone.is_retryable());
        assert!(!FetchError::Unauthorized.is_retryable());
        assert!(!FetchError::Status(400).is_retryable());
        assert!(!FetchError::Io("disk full".into()).is_retryable());
    }

    #[test]
    fn test_from_status_mapping() {
        assert_eq!(FetchError::from_status(401), FetchError::Unauthorized);
        assert_eq!(FetchError::from_status(403), FetchError::Unauthorized);
        assert_eq!(FetchError::from_status(404), FetchError::Gone);
        assert_eq!(FetchError::from_status(410), FetchError::Gone);
        assert_eq!(FetchError::from_status(500), FetchError::Status(500));
    }
}
