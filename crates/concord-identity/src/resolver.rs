use concord_core::types::{Issue, TrackerSource};
use concord_store::{MappingStore, Result};
use concord_trackers::client::RemoteIssue;
use concord_trackers::vibe::extract_huly_tag;

use crate::tags::extract_beads_tag;

/// Locates a mapped entity's counterpart using the priority order from §4.3:
/// stored cross-system id, then a description-tag fallback, then a
/// normalized-title match scoped to the project. Never creates a
/// counterpart itself — callers decide whether a `None` result means "create
/// a new one", and only do so outside read-only phases (§4.3: "the resolver
/// must not create counterparts during read-only phases").
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `remote`, reported by `source`, to its existing row in the
    /// mapping store (if any).
    pub async fn resolve(
        &self,
        store: &MappingStore,
        project_identifier: &str,
        source: TrackerSource,
        remote: &RemoteIssue,
    ) -> Result<Option<Issue>> {
        if let Some(found) = self.resolve_by_stored_id(store, source, remote).await? {
            return Ok(Some(found));
        }
        if let Some(found) = self.resolve_by_tag(store, project_identifier, source, remote).await? {
            return Ok(Some(found));
        }
        store.find_issue_by_title(project_identifier, &remote.title).await
    }

    async fn resolve_by_stored_id(
        &self,
        store: &MappingStore,
        source: TrackerSource,
        remote: &RemoteIssue,
    ) -> Result<Option<Issue>> {
        match source {
            TrackerSource::Huly => store.find_issue_by_huly_id(&remote.remote_id).await,
            TrackerSource::Vibe => store.find_issue_by_vibe_id(&remote.remote_id).await,
            TrackerSource::Beads => store.find_issue_by_beads_id(&remote.remote_id).await,
            TrackerSource::Scheduled => Ok(None),
        }
    }

    /// Fallback #2: search for the opposite tracker's identifier embedded in
    /// the reported entity's description (§4.1 Vibe convention, §4.3).
    async fn resolve_by_tag(
        &self,
        store: &MappingStore,
        project_identifier: &str,
        source: TrackerSource,
        remote: &RemoteIssue,
    ) -> Result<Option<Issue>> {
        match source {
            // A Vibe task's description may carry "Huly Issue: PROJ-N" /
            // "Synced from Huly: PROJ-N" — that identifier is the issue's
            // primary key when Huly originated it.
            TrackerSource::Vibe => match extract_huly_tag(&remote.description) {
                Some(huly_identifier) => store.get_issue(project_identifier, &huly_identifier).await,
                None => Ok(None),
            },
            // A Beads issue's description may carry the same Huly tag
            // convention (Beads treats Huly as authoritative for parentage
            // and often gets created by a Huly->Beads sync).
            TrackerSource::Beads => match extract_huly_tag(&remote.description) {
                Some(huly_identifier) => store.get_issue(project_identifier, &huly_identifier).await,
                None => Ok(None),
            },
            // A Huly issue's description may carry a "Beads Issue: <id>"
            // back-reference when it was created from a Beads-origin sync.
            TrackerSource::Huly => match extract_beads_tag(&remote.description) {
                Some(beads_identifier) => store.find_issue_by_beads_id(&beads_identifier).await,
                None => Ok(None),
            },
            TrackerSource::Scheduled => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use concord_core::types::{CanonicalPriority, CanonicalStatus};

    fn remote(remote_id: &str, title: &str, description: &str) -> RemoteIssue {
        RemoteIssue {
            remote_id: remote_id.to_string(),
            identifier: remote_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            status: CanonicalStatus::Todo,
            priority: CanonicalPriority::Medium,
            parent_remote_id: None,
            modified_at: Utc::now(),
            deleted: false,
        }
    }

    async fn seeded_store() -> MappingStore {
        let store = MappingStore::new_in_memory().await.unwrap();
        let mut issue = Issue::new("PROJ-1", "PROJ");
        issue.huly_id = Some("huly-abc".to_string());
        issue.title = "Fix the thing".to_string();
        store.upsert_issue(&issue).await.unwrap();
        store
    }

    #[tokio::test]
    async fn resolves_by_stored_huly_id() {
        let store = seeded_store().await;
        let resolver = IdentityResolver::new();
        let found = resolver
            .resolve(&store, "PROJ", TrackerSource::Huly, &remote("huly-abc", "Fix the thing", ""))
            .await
            .unwrap();
        assert_eq!(found.unwrap().identifier, "PROJ-1");
    }

    #[tokio::test]
    async fn resolves_vibe_task_via_huly_tag_when_unmapped() {
        let store = seeded_store().await;
        let resolver = IdentityResolver::new();
        let task = remote("vibe-999", "Different title", "Huly Issue: PROJ-1");
        let found = resolver.resolve(&store, "PROJ", TrackerSource::Vibe, &task).await.unwrap();
        assert_eq!(found.unwrap().identifier, "PROJ-1");
    }

    #[tokio::test]
    async fn resolves_by_normalized_title_as_last_resort() {
        let store = seeded_store().await;
        let resolver = IdentityResolver::new();
        let task = remote("vibe-999", "  fix THE thing  ", "no tag here");
        let found = resolver.resolve(&store, "PROJ", TrackerSource::Vibe, &task).await.unwrap();
        assert_eq!(found.unwrap().identifier, "PROJ-1");
    }

    #[tokio::test]
    async fn returns_none_when_nothing_matches() {
        let store = seeded_store().await;
        let resolver = IdentityResolver::new();
        let task = remote("vibe-999", "Totally unrelated", "");
        let found = resolver.resolve(&store, "PROJ", TrackerSource::Vibe, &task).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn huly_resolves_beads_counterpart_via_tag() {
        let store = MappingStore::new_in_memory().await.unwrap();
        let mut issue = Issue::new("PROJ-1", "PROJ");
        issue.beads_id = Some("bd-17".to_string());
        store.upsert_issue(&issue).await.unwrap();

        let resolver = IdentityResolver::new();
        let huly_issue = remote("huly-xyz", "Something else", "Beads Issue: bd-17");
        let found = resolver
            .resolve(&store, "PROJ", TrackerSource::Huly, &huly_issue)
            .await
            .unwrap();
        assert_eq!(found.unwrap().identifier, "PROJ-1");
    }
}
