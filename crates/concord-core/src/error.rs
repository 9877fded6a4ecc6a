use thiserror::Error;

/// The error taxonomy shared across the sync engine (§7).
///
/// Each tracker client and activity defines its own narrower error type and
/// converts into this one at the crate boundary, the way the teacher's
/// `GitHubError`/`LinearError` wrap `octocrab::Error`/`reqwest::Error`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure, 5xx, rate-limited, or subprocess timeout. Retried
    /// by the activity retry policy (§4.5).
    #[error("transient error: {0}")]
    Transient(String),

    /// Malformed payload from a tracker. Non-retryable.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced entity does not exist in the target tracker.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication/authorization failure talking to a tracker.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Two sides updated incompatibly within the same tick and the conflict
    /// policy (§4.7) could not resolve it deterministically.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A mapping-store constraint violation. Fatal to the workflow, not to
    /// the process (§7).
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Programmer error — should never be reachable in a correct build.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SyncError {
    /// Whether the activity retry policy (§4.5) should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(SyncError::Transient("x".into()).is_retryable());
        assert!(!SyncError::Validation("x".into()).is_retryable());
        assert!(!SyncError::NotFound("x".into()).is_retryable());
        assert!(!SyncError::Unauthorized("x".into()).is_retryable());
        assert!(!SyncError::Conflict("x".into()).is_retryable());
        assert!(!SyncError::Integrity("x".into()).is_retryable());
        assert!(!SyncError::Fatal("x".into()).is_retryable());
    }
}
