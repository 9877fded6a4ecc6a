use chrono::Duration;
use std::collections::HashMap;

use concord_core::error::SyncError;
use concord_core::hash::content_hash;
use concord_core::types::{CanonicalPriority, CanonicalStatus};
use concord_resilience::CircuitBreakerError;

use crate::context::WorkflowContext;
use crate::project_sync::{project_sync, ProjectSyncOutcome};

/// Result of one `FullOrchestration` pass over every project to sync
/// (§4.6.3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullOrchestrationOutcome {
    pub sync_run_id: String,
    pub projects_processed: u32,
    pub projects_failed: u32,
    pub projects_skipped_open_circuit: u32,
    pub issues_synced: u32,
    pub errors: Vec<String>,
}

/// How long a project's cached description hash / issue count is trusted
/// before `ProjectSync` is owed a sweep regardless of observed changes
/// (`cache.expiry`, §4.2 default 15 minutes).
const CACHE_EXPIRY: Duration = Duration::minutes(15);

/// List every project known to Huly plus every project already tracked in
/// the mapping store, filter down to the ones owed a sweep
/// (`GetProjectsToSync`, §4.2), and run `ProjectSync` on each — skipping any
/// project whose circuit breaker is open (§4.8) rather than letting a
/// chronically-failing project starve the rest of the sweep.
pub async fn full_orchestration(ctx: &WorkflowContext) -> Result<FullOrchestrationOutcome, SyncError> {
    let sync_run_id = ctx
        .store
        .start_sync_run(uuid::Uuid::new_v4().to_string())
        .await
        .map_err(SyncError::from)?;

    let huly_projects = ctx.trackers.huly.list_projects().await.unwrap_or_default();
    let mut desc_hashes = HashMap::new();
    for remote in &huly_projects {
        let hash = content_hash(
            &remote.name,
            remote.description.as_deref().unwrap_or_default(),
            CanonicalStatus::Todo,
            CanonicalPriority::Medium,
        );
        desc_hashes.insert(remote.identifier.clone(), hash.clone());

        // Newly observed Huly project — register it so it is eligible for
        // `ProjectSync` on this or a later sweep.
        if ctx
            .store
            .get_project(&remote.identifier)
            .await
            .map_err(SyncError::from)?
            .is_none()
        {
            let mut project = concord_core::types::Project::new(remote.identifier.clone());
            project.huly_id = Some(remote.remote_id.clone());
            project.description_hash = Some(hash);
            ctx.store.upsert_project(&project).await.map_err(SyncError::from)?;
        }
    }

    let candidates = ctx
        .store
        .get_projects_to_sync(CACHE_EXPIRY, desc_hashes)
        .await
        .map_err(SyncError::from)?;

    let mut outcome = FullOrchestrationOutcome {
        sync_run_id: sync_run_id.clone(),
        ..Default::default()
    };

    for project in candidates {
        let breaker_key = project.identifier.clone();
        let result = ctx
            .project_breakers
            .call(breaker_key, || project_sync(ctx, &project.identifier))
            .await;

        match result {
            Ok(ProjectSyncOutcome {
                issues_synced,
                issues_failed,
                errors,
                ..
            }) => {
                outcome.projects_processed += 1;
                outcome.issues_synced += issues_synced;
                if issues_failed > 0 {
                    outcome.projects_failed += 1;
                }
                outcome.errors.extend(errors);
            }
            Err(CircuitBreakerError::Open(_)) => {
                outcome.projects_skipped_open_circuit += 1;
            }
            Err(other) => {
                outcome.projects_processed += 1;
                outcome.projects_failed += 1;
                outcome.errors.push(other.to_string());
            }
        }
    }

    ctx.store
        .complete_sync_run(
            &sync_run_id,
            outcome.projects_processed,
            outcome.projects_failed,
            outcome.issues_synced,
            outcome.errors.clone(),
        )
        .await
        .map_err(SyncError::from)?;

    Ok(outcome)
}

/// Resolve a CLI-supplied project name/folder into its stored identifier,
/// then run `ProjectSync` for that single project only (`concord sync
/// <project>`, §6).
pub async fn single_project_orchestration(
    ctx: &WorkflowContext,
    name_or_folder: &str,
) -> Result<ProjectSyncOutcome, SyncError> {
    let identifier = ctx
        .store
        .resolve_project_identifier(name_or_folder)
        .await
        .map_err(SyncError::from)?
        .ok_or_else(|| SyncError::NotFound(format!("project {name_or_folder}")))?;
    project_sync(ctx, &identifier).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_expiry_matches_fifteen_minutes() {
        assert_eq!(CACHE_EXPIRY, Duration::minutes(15));
    }
}
