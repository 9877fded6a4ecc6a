use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concord_core::error::{Result, SyncError};
use concord_core::types::{CanonicalPriority, CanonicalStatus};
use serde::{Deserialize, Serialize};

/// A project as reported by a tracker, before identity resolution maps it
/// onto a [`concord_core::types::Project`] (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProject {
    pub remote_id: String,
    pub identifier: String,
    pub name: String,
    pub description: Option<String>,
}

/// An issue as reported by a tracker, in canonical fields already (§4.6.1
/// field-level contract: only title/description/status/priority/parent are
/// synced, so the tracker client itself performs the canonicalization).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteIssue {
    pub remote_id: String,
    pub identifier: String,
    pub title: String,
    pub description: String,
    pub status: CanonicalStatus,
    pub priority: CanonicalPriority,
    pub parent_remote_id: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub deleted: bool,
}

/// A sparse patch applied via `UpdateIssue` — only fields the caller wants
/// to change are `Some`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<CanonicalStatus>,
    pub priority: Option<CanonicalPriority>,
    pub parent_remote_id: Option<String>,
}

/// The capability set every tracker exposes uniformly (§4.1). Each
/// implementation maps its own transport errors into [`SyncError`] at this
/// boundary so callers never see `reqwest::Error` or subprocess-exit codes
/// directly.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn health_check(&self) -> Result<()>;
    async fn list_projects(&self) -> Result<Vec<RemoteProject>>;
    async fn get_project(&self, remote_id: &str) -> Result<RemoteProject>;
    async fn list_issues(&self, project_remote_id: &str, since_cursor: Option<&str>) -> Result<Vec<RemoteIssue>>;
    async fn get_issue(&self, remote_id: &str) -> Result<RemoteIssue>;
    async fn create_issue(&self, project_remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue>;
    async fn update_issue(&self, remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue>;
    async fn delete_issue(&self, remote_id: &str) -> Result<()>;

    /// Not every tracker supports creating a sub-issue directly (Beads
    /// models parent/child as a separate dependency edge) — default to
    /// "unsupported" rather than forcing every implementor to stub it out.
    async fn create_sub_issue(&self, _parent_remote_id: &str, _fields: &IssueFields) -> Result<RemoteIssue> {
        Err(SyncError::Validation("create_sub_issue not supported by this tracker".into()))
    }
}

/// Maps an HTTP status code to the error taxonomy shared across tracker
/// clients (§4.1, §7).
pub fn classify_http_status(status: u16, body: impl Into<String>) -> SyncError {
    let body = body.into();
    match status {
        404 => SyncError::NotFound(body),
        401 | 403 => SyncError::Unauthorized(body),
        409 => SyncError::Conflict(body),
        429 => SyncError::Transient(format!("rate limited: {body}")),
        400..=499 => SyncError::Validation(body),
        _ => SyncError::Transient(format!("http {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_not_found() {
        assert!(matches!(classify_http_status(404, "x"), SyncError::NotFound(_)));
    }

    #[test]
    fn classifies_auth_failures() {
        assert!(matches!(classify_http_status(401, "x"), SyncError::Unauthorized(_)));
        assert!(matches!(classify_http_status(403, "x"), SyncError::Unauthorized(_)));
    }

    #[test]
    fn classifies_conflict() {
        assert!(matches!(classify_http_status(409, "x"), SyncError::Conflict(_)));
    }

    #[test]
    fn classifies_server_errors_as_transient() {
        assert!(matches!(classify_http_status(503, "x"), SyncError::Transient(_)));
    }

    #[test]
    fn classifies_rate_limit_as_transient() {
        assert!(matches!(classify_http_status(429, "x"), SyncError::Transient(_)));
    }

    #[test]
    fn classifies_other_4xx_as_validation() {
        assert!(matches!(classify_http_status(422, "x"), SyncError::Validation(_)));
    }
}
