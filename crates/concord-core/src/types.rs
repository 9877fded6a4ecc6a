use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TrackerSource
// ---------------------------------------------------------------------------

/// One of the three trackers this engine keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerSource {
    Huly,
    Vibe,
    Beads,
    /// Not a tracker: the periodic sweep that discovers work on its own.
    Scheduled,
}

impl std::fmt::Display for TrackerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrackerSource::Huly => "huly",
            TrackerSource::Vibe => "vibe",
            TrackerSource::Beads => "beads",
            TrackerSource::Scheduled => "scheduled",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// CanonicalStatus / CanonicalPriority
// ---------------------------------------------------------------------------

/// The canonical issue status, named after Huly's own vocabulary since Huly
/// is the authoritative source for parent/child relationships and the
/// system most field names are borrowed from (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Backlog,
    Todo,
    InProgress,
    InReview,
    Done,
    Cancelled,
}

impl Default for CanonicalStatus {
    fn default() -> Self {
        CanonicalStatus::Backlog
    }
}

/// The canonical 5-level priority scale (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalPriority {
    NoPriority = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Urgent = 4,
}

impl Default for CanonicalPriority {
    fn default() -> Self {
        CanonicalPriority::Medium
    }
}

// ---------------------------------------------------------------------------
// ProjectStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub identifier: String,
    pub huly_id: Option<String>,
    pub vibe_id: Option<String>,
    pub repo_path: Option<String>,
    pub git_url: Option<String>,
    pub issue_count: u64,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_cursor: Option<String>,
    pub description_hash: Option<String>,
    pub status: ProjectStatus,
}

impl Project {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            huly_id: None,
            vibe_id: None,
            repo_path: None,
            git_url: None,
            issue_count: 0,
            last_checked_at: None,
            last_sync_at: None,
            sync_cursor: None,
            description_hash: None,
            status: ProjectStatus::Active,
        }
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub identifier: String,
    pub project_identifier: String,
    pub huly_id: Option<String>,
    pub vibe_id: Option<String>,
    pub beads_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: CanonicalStatus,
    pub priority: CanonicalPriority,
    pub parent_identifier: Option<String>,
    pub parent_beads_id: Option<String>,
    pub sub_issue_count: u32,
    pub huly_modified_at: Option<DateTime<Utc>>,
    pub vibe_modified_at: Option<DateTime<Utc>>,
    pub beads_modified_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub content_hash: String,
    pub huly_content_hash: Option<String>,
    pub beads_content_hash: Option<String>,
    pub deleted_from_huly: bool,
    pub deleted_from_beads: bool,
}

impl Issue {
    /// Create a freshly-observed issue. `content_hash` must be computed by
    /// the caller via [`crate::hash::content_hash`] — the hash depends on
    /// the normalized field values, not on construction order.
    pub fn new(identifier: impl Into<String>, project_identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            project_identifier: project_identifier.into(),
            huly_id: None,
            vibe_id: None,
            beads_id: None,
            title: String::new(),
            description: String::new(),
            status: CanonicalStatus::default(),
            priority: CanonicalPriority::default(),
            parent_identifier: None,
            parent_beads_id: None,
            sub_issue_count: 0,
            huly_modified_at: None,
            vibe_modified_at: None,
            beads_modified_at: None,
            last_sync_at: None,
            content_hash: String::new(),
            huly_content_hash: None,
            beads_content_hash: None,
            deleted_from_huly: false,
            deleted_from_beads: false,
        }
    }

    /// Whether the Huly side is known to already reflect this issue's
    /// current content (invariant 2 in §3).
    pub fn huly_is_current(&self) -> bool {
        self.huly_content_hash.as_deref() == Some(self.content_hash.as_str())
    }

    /// Whether the Beads side is known to already reflect this issue's
    /// current content.
    pub fn beads_is_current(&self) -> bool {
        self.beads_content_hash.as_deref() == Some(self.content_hash.as_str())
    }

    /// Recover the project identifier from a bare Huly-style issue key
    /// (`PROJ-NNN`, §3) by dropping the trailing `-NNN`. Used by the
    /// webhook receiver, whose payload carries only the issue id, not the
    /// project it belongs to.
    pub fn project_identifier_of(identifier: &str) -> Option<&str> {
        identifier.rsplit_once('-').map(|(project, _seq)| project)
    }
}

// ---------------------------------------------------------------------------
// SyncMetadata
// ---------------------------------------------------------------------------

/// A single key/value row in the `sync_metadata` table (§3), e.g.
/// `last_sync=<millis-since-epoch>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub key: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// SyncRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub projects_processed: u32,
    pub projects_failed: u32,
    pub issues_synced: u32,
    pub errors: Vec<String>,
    pub duration_ms: Option<u64>,
}

impl SyncRun {
    pub fn start(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
            completed_at: None,
            projects_processed: 0,
            projects_failed: 0,
            issues_synced: 0,
            errors: Vec::new(),
            duration_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeEvent — in-flight only, never persisted
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub source: TrackerSource,
    pub entity_ref: String,
    pub kind: ChangeKind,
    pub payload: serde_json::Value,
    pub observed_at: DateTime<Utc>,
    pub correlation_id: String,
}

impl ChangeEvent {
    pub fn new(
        source: TrackerSource,
        entity_ref: impl Into<String>,
        kind: ChangeKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            source,
            entity_ref: entity_ref.into(),
            kind,
            payload,
            observed_at: Utc::now(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_huly_is_current_when_hashes_match() {
        let mut issue = Issue::new("PROJ-1", "PROJ");
        issue.content_hash = "abc".into();
        issue.huly_content_hash = Some("abc".into());
        assert!(issue.huly_is_current());
    }

    #[test]
    fn issue_huly_is_not_current_when_hashes_differ() {
        let mut issue = Issue::new("PROJ-1", "PROJ");
        issue.content_hash = "abc".into();
        issue.huly_content_hash = Some("def".into());
        assert!(!issue.huly_is_current());
    }

    #[test]
    fn issue_huly_is_not_current_when_unknown() {
        let issue = Issue::new("PROJ-1", "PROJ");
        assert!(!issue.huly_is_current());
    }

    #[test]
    fn priority_ordering_matches_scale() {
        assert!(CanonicalPriority::Urgent > CanonicalPriority::High);
        assert!(CanonicalPriority::High > CanonicalPriority::Medium);
        assert!(CanonicalPriority::Medium > CanonicalPriority::Low);
        assert!(CanonicalPriority::Low > CanonicalPriority::NoPriority);
    }

    #[test]
    fn tracker_source_display() {
        assert_eq!(TrackerSource::Huly.to_string(), "huly");
        assert_eq!(TrackerSource::Beads.to_string(), "beads");
    }

    #[test]
    fn project_identifier_of_strips_trailing_sequence() {
        assert_eq!(Issue::project_identifier_of("PROJ-42"), Some("PROJ"));
        assert_eq!(Issue::project_identifier_of("MULTI-WORD-9"), Some("MULTI-WORD"));
    }

    #[test]
    fn project_identifier_of_none_without_dash() {
        assert_eq!(Issue::project_identifier_of("NODASH"), None);
    }
}
