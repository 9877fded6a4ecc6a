use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use concord_core::error::SyncError;
use concord_core::types::TrackerSource;

use crate::context::WorkflowContext;
use crate::single_issue::single_issue_sync;

/// Result of one `ProjectSync` sweep (§4.6.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSyncOutcome {
    pub project_identifier: String,
    pub issues_synced: u32,
    pub issues_failed: u32,
    pub errors: Vec<String>,
}

/// Sweep a single project across all three trackers:
///
/// - Phase 1 (Huly->Vibe): list Huly issues since cursor, sync each.
/// - Phase 2 (Vibe->Huly): list Vibe tasks modified since cursor, sync each.
/// - Phase 3a/3b (Beads<->Huly): read the repo's JSONL if present, sync
///   Beads-origin changes, then push any Huly-origin content mismatch not
///   yet reflected in Beads.
///
/// On success, `syncCursor`/`lastSyncAt` advance atomically; on partial
/// failure they are left untouched so the next sweep retries everything
/// (§4.6.2, invariant 5 in §3: cursor only advances on successful
/// completion).
pub async fn project_sync(ctx: &WorkflowContext, project_identifier: &str) -> Result<ProjectSyncOutcome, SyncError> {
    let project = ctx
        .store
        .get_project(project_identifier)
        .await
        .map_err(SyncError::from)?
        .ok_or_else(|| SyncError::NotFound(format!("project {project_identifier}")))?;

    let mut outcome = ProjectSyncOutcome {
        project_identifier: project_identifier.to_string(),
        ..Default::default()
    };

    // Phase 1: Huly -> Vibe.
    if let Some(huly_remote_id) = &project.huly_id {
        let huly_client = ctx.trackers.get(TrackerSource::Huly, project_identifier)?;
        let remote_issues = huly_client
            .list_issues(huly_remote_id, project.sync_cursor.as_deref())
            .await?;
        let identifiers: Vec<String> = remote_issues.into_iter().map(|i| i.identifier).collect();
        sync_many(ctx, project_identifier, TrackerSource::Huly, identifiers, &mut outcome).await;
    }

    // Phase 2: Vibe -> Huly.
    if let Some(vibe_remote_id) = &project.vibe_id {
        let vibe_client = ctx.trackers.get(TrackerSource::Vibe, project_identifier)?;
        let remote_issues = vibe_client
            .list_issues(vibe_remote_id, project.sync_cursor.as_deref())
            .await?;
        let identifiers: Vec<String> = remote_issues.into_iter().map(|i| i.identifier).collect();
        sync_many(ctx, project_identifier, TrackerSource::Vibe, identifiers, &mut outcome).await;
    }

    // Phase 3a/3b: Beads <-> Huly, only when the project has a repository.
    if let Some(repo_path) = &project.repo_path {
        let beads_client = ctx.trackers.get(TrackerSource::Beads, project_identifier)?;
        let remote_issues = beads_client.list_issues(repo_path, None).await?;
        let identifiers: Vec<String> = remote_issues.into_iter().map(|i| i.identifier).collect();
        sync_many(ctx, project_identifier, TrackerSource::Beads, identifiers, &mut outcome).await;

        // 3b: push Huly-origin changes not yet reflected in Beads.
        let mismatched = ctx
            .store
            .get_issues_with_content_mismatch(project_identifier)
            .await
            .map_err(SyncError::from)?;
        let pending: Vec<String> = mismatched
            .into_iter()
            .filter(|issue| issue.beads_id.is_some() && issue.huly_id.is_some())
            .map(|issue| issue.identifier)
            .collect();
        sync_many(ctx, project_identifier, TrackerSource::Huly, pending, &mut outcome).await;
    }

    if outcome.issues_failed == 0 {
        let now = Utc::now();
        ctx.store
            .advance_cursor(project_identifier, Some(now.to_rfc3339()), now)
            .await
            .map_err(SyncError::from)?;
    }

    ctx.sinks.notify_project_synced(project_identifier).await;

    Ok(outcome)
}

/// Run `single_issue_sync` over `identifiers` with bounded parallelism
/// (`sync.max_workers`, default 5, §4.6.2), tallying successes/failures into
/// `outcome`. Across different entities there is no ordering guarantee
/// (§5), so `buffer_unordered` is the right shape here.
async fn sync_many(
    ctx: &WorkflowContext,
    project_identifier: &str,
    source: TrackerSource,
    identifiers: Vec<String>,
    outcome: &mut ProjectSyncOutcome,
) {
    let results: Vec<Result<crate::single_issue::SingleIssueSyncOutcome, SyncError>> = stream::iter(identifiers)
        .map(|entity_ref| async move { single_issue_sync(ctx, project_identifier, source, &entity_ref).await })
        .buffer_unordered(ctx.max_workers.max(1))
        .collect()
        .await;

    for result in results {
        match result {
            Ok(_) => outcome.issues_synced += 1,
            Err(err) => {
                outcome.issues_failed += 1;
                outcome.errors.push(err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let store = concord_store::MappingStore::new_in_memory().await.unwrap();
        let ctx = crate::context::WorkflowContext {
            store: std::sync::Arc::new(store),
            trackers: test_trackers(),
            identity: concord_identity::IdentityResolver::new(),
            sinks: std::sync::Arc::new(concord_sinks::NoopSink),
            api_delay_ms: 0,
            dry_run: false,
            max_workers: 5,
            project_breakers: std::sync::Arc::new(concord_resilience::CircuitBreakerRegistry::new(
                concord_resilience::CircuitBreakerConfig::default(),
            )),
        };
        let result = project_sync(&ctx, "NOPE").await;
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }

    fn test_trackers() -> crate::context::Trackers {
        use async_trait::async_trait;
        use concord_trackers::client::{IssueFields, RemoteIssue, RemoteProject, TrackerClient};

        struct DummyClient;
        #[async_trait]
        impl TrackerClient for DummyClient {
            async fn health_check(&self) -> concord_core::error::Result<()> {
                Ok(())
            }
            async fn list_projects(&self) -> concord_core::error::Result<Vec<RemoteProject>> {
                Ok(Vec::new())
            }
            async fn get_project(&self, _remote_id: &str) -> concord_core::error::Result<RemoteProject> {
                Err(SyncError::NotFound("n/a".into()))
            }
            async fn list_issues(&self, _p: &str, _c: Option<&str>) -> concord_core::error::Result<Vec<RemoteIssue>> {
                Ok(Vec::new())
            }
            async fn get_issue(&self, _remote_id: &str) -> concord_core::error::Result<RemoteIssue> {
                Err(SyncError::NotFound("n/a".into()))
            }
            async fn create_issue(&self, _p: &str, _f: &IssueFields) -> concord_core::error::Result<RemoteIssue> {
                Err(SyncError::NotFound("n/a".into()))
            }
            async fn update_issue(&self, _id: &str, _f: &IssueFields) -> concord_core::error::Result<RemoteIssue> {
                Err(SyncError::NotFound("n/a".into()))
            }
            async fn delete_issue(&self, _id: &str) -> concord_core::error::Result<()> {
                Ok(())
            }
        }

        crate::context::Trackers::new(
            std::sync::Arc::new(DummyClient),
            std::sync::Arc::new(DummyClient),
            |_project| None,
        )
    }
}
