use chrono::Utc;

use concord_core::error::SyncError;
use concord_core::hash::content_hash;
use concord_core::types::{Issue, TrackerSource};
use concord_identity::with_beads_tag;
use concord_resilience::api_delay;
use concord_trackers::client::{IssueFields, RemoteIssue, TrackerClient};
use concord_trackers::vibe::with_huly_tag;

use crate::conflict::{self, SyncDirection};
use crate::context::WorkflowContext;

/// Result of one `SingleIssueSync` run (§4.6.1), reported back through the
/// workflow executor's coalescing cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleIssueSyncOutcome {
    pub issue_identifier: String,
    pub short_circuited: bool,
    pub soft_deleted: bool,
    pub propagated_to: Vec<TrackerSource>,
    pub skipped: Vec<TrackerSource>,
}

/// The three activities of `SingleIssueSync`: fetch from `source`, resolve
/// identity, compare content hashes, decide per-target direction, apply,
/// notify. Each tracker call and store write is its own suspension point
/// (§5); the function itself runs sequentially, matching the "activities
/// execute in the order written" ordering guarantee.
pub async fn single_issue_sync(
    ctx: &WorkflowContext,
    project_identifier: &str,
    source: TrackerSource,
    entity_ref: &str,
) -> Result<SingleIssueSyncOutcome, SyncError> {
    let project = ctx
        .store
        .get_project(project_identifier)
        .await
        .map_err(SyncError::from)?
        .ok_or_else(|| SyncError::NotFound(format!("project {project_identifier}")))?;

    let source_client = ctx.trackers.get(source, project_identifier)?;

    // 1. Fetch current state from `source`.
    let remote = source_client.get_issue(entity_ref).await?;
    api_delay(ctx.api_delay_ms).await;

    // 2. Resolve counterparts (C3).
    let resolved = ctx
        .identity
        .resolve(&ctx.store, project_identifier, source, &remote)
        .await
        .map_err(SyncError::from)?;

    let issue_identifier = match &resolved {
        Some(existing) => existing.identifier.clone(),
        None if source == TrackerSource::Huly => remote.identifier.clone(),
        None => format!("{project_identifier}-ext-{}", remote.remote_id),
    };
    let mut issue = resolved.unwrap_or_else(|| Issue::new(issue_identifier.clone(), project_identifier));
    set_source_id(&mut issue, source, &remote);

    if remote.deleted {
        mark_deleted(&mut issue, source);
        issue.last_sync_at = Some(Utc::now());
        ctx.store.upsert_issue(&issue).await.map_err(SyncError::from)?;
        ctx.sinks.notify_issue_synced(project_identifier, &issue_identifier).await;
        return Ok(SingleIssueSyncOutcome {
            issue_identifier,
            short_circuited: false,
            soft_deleted: true,
            propagated_to: Vec::new(),
            skipped: Vec::new(),
        });
    }

    // 3. Content-hash short-circuit (invariant 2, §3; scenario 6, §8).
    let new_hash = content_hash(&remote.title, &remote.description, remote.status, remote.priority);
    if !issue.content_hash.is_empty() && issue.content_hash == new_hash {
        set_source_content_hash(&mut issue, source, &new_hash);
        issue.last_sync_at = Some(Utc::now());
        ctx.store.upsert_issue(&issue).await.map_err(SyncError::from)?;
        ctx.sinks.notify_issue_synced(project_identifier, &issue_identifier).await;
        return Ok(SingleIssueSyncOutcome {
            issue_identifier,
            short_circuited: true,
            soft_deleted: false,
            propagated_to: Vec::new(),
            skipped: Vec::new(),
        });
    }

    issue.title = remote.title.clone();
    issue.description = remote.description.clone();
    issue.status = remote.status;
    issue.priority = remote.priority;
    issue.content_hash = new_hash.clone();
    set_source_content_hash(&mut issue, source, &new_hash);

    // 4. Conflict decision + 5. apply, one target at a time (§4.7).
    let mut propagated_to = Vec::new();
    let mut skipped = Vec::new();
    for target in other_sources(source) {
        let target_modified_at = modified_at_for(&issue, target);
        match conflict::decide(remote.modified_at, target_modified_at) {
            SyncDirection::Skip => skipped.push(target),
            SyncDirection::Propagate if ctx.dry_run => skipped.push(target),
            SyncDirection::Propagate => {
                let target_client = ctx.trackers.get(target, project_identifier)?;
                let existing_remote_id = remote_id_for(&issue, target);
                let fields = IssueFields {
                    title: Some(issue.title.clone()),
                    description: Some(description_for_target(target, &issue)),
                    status: Some(issue.status),
                    priority: Some(issue.priority),
                    parent_remote_id: None,
                };
                let project_remote_id = project_remote_id_for(target, &project);
                let applied = apply_target(&*target_client, project_remote_id, existing_remote_id.as_deref(), fields).await?;
                api_delay(ctx.api_delay_ms).await;
                record_applied(&mut issue, target, &applied, &new_hash);
                propagated_to.push(target);
            }
        }
    }

    issue.last_sync_at = Some(Utc::now());
    ctx.store.upsert_issue(&issue).await.map_err(SyncError::from)?;

    // 6. Best-effort notify (C9); failures here never fail the workflow —
    // `ChangeSink` has no error channel to surface one through.
    ctx.sinks.notify_issue_synced(project_identifier, &issue_identifier).await;

    Ok(SingleIssueSyncOutcome {
        issue_identifier,
        short_circuited: false,
        soft_deleted: false,
        propagated_to,
        skipped,
    })
}

fn other_sources(source: TrackerSource) -> [TrackerSource; 2] {
    match source {
        TrackerSource::Huly => [TrackerSource::Vibe, TrackerSource::Beads],
        TrackerSource::Vibe => [TrackerSource::Huly, TrackerSource::Beads],
        TrackerSource::Beads => [TrackerSource::Huly, TrackerSource::Vibe],
        TrackerSource::Scheduled => [TrackerSource::Huly, TrackerSource::Vibe],
    }
}

fn set_source_id(issue: &mut Issue, source: TrackerSource, remote: &RemoteIssue) {
    match source {
        TrackerSource::Huly => {
            issue.huly_id = Some(remote.remote_id.clone());
            issue.huly_modified_at = Some(remote.modified_at);
        }
        TrackerSource::Vibe => {
            issue.vibe_id = Some(remote.remote_id.clone());
            issue.vibe_modified_at = Some(remote.modified_at);
        }
        TrackerSource::Beads => {
            issue.beads_id = Some(remote.remote_id.clone());
            issue.beads_modified_at = Some(remote.modified_at);
        }
        TrackerSource::Scheduled => {}
    }
}

fn mark_deleted(issue: &mut Issue, source: TrackerSource) {
    match source {
        TrackerSource::Huly => issue.deleted_from_huly = true,
        TrackerSource::Beads => issue.deleted_from_beads = true,
        // Vibe has no dedicated soft-delete flag (§3 data model) — a
        // Vibe-side delete is reported but not cascaded or flagged; Huly
        // remains authoritative for the issue's existence.
        TrackerSource::Vibe | TrackerSource::Scheduled => {}
    }
}

fn set_source_content_hash(issue: &mut Issue, source: TrackerSource, hash: &str) {
    match source {
        TrackerSource::Huly => issue.huly_content_hash = Some(hash.to_string()),
        TrackerSource::Beads => issue.beads_content_hash = Some(hash.to_string()),
        TrackerSource::Vibe | TrackerSource::Scheduled => {}
    }
}

fn modified_at_for(issue: &Issue, target: TrackerSource) -> Option<chrono::DateTime<Utc>> {
    match target {
        TrackerSource::Huly => issue.huly_modified_at,
        TrackerSource::Vibe => issue.vibe_modified_at,
        TrackerSource::Beads => issue.beads_modified_at,
        TrackerSource::Scheduled => None,
    }
}

fn remote_id_for(issue: &Issue, target: TrackerSource) -> Option<String> {
    match target {
        TrackerSource::Huly => issue.huly_id.clone(),
        TrackerSource::Vibe => issue.vibe_id.clone(),
        TrackerSource::Beads => issue.beads_id.clone(),
        TrackerSource::Scheduled => None,
    }
}

fn project_remote_id_for(target: TrackerSource, project: &concord_core::types::Project) -> Option<String> {
    match target {
        TrackerSource::Huly => project.huly_id.clone(),
        TrackerSource::Vibe => project.vibe_id.clone(),
        TrackerSource::Beads => project.repo_path.clone(),
        TrackerSource::Scheduled => None,
    }
}

/// Huly and Vibe carry a back-reference convention in their description
/// (§4.1); Beads descriptions are left untouched.
fn description_for_target(target: TrackerSource, issue: &Issue) -> String {
    match target {
        TrackerSource::Vibe => with_huly_tag(&issue.description, &issue.identifier),
        TrackerSource::Huly => match &issue.beads_id {
            Some(beads_id) => with_beads_tag(&issue.description, beads_id),
            None => issue.description.clone(),
        },
        TrackerSource::Beads | TrackerSource::Scheduled => issue.description.clone(),
    }
}

fn record_applied(issue: &mut Issue, target: TrackerSource, applied: &RemoteIssue, new_hash: &str) {
    match target {
        TrackerSource::Huly => {
            issue.huly_id = Some(applied.remote_id.clone());
            issue.huly_modified_at = Some(applied.modified_at);
            issue.huly_content_hash = Some(new_hash.to_string());
        }
        TrackerSource::Vibe => {
            issue.vibe_id = Some(applied.remote_id.clone());
            issue.vibe_modified_at = Some(applied.modified_at);
        }
        TrackerSource::Beads => {
            issue.beads_id = Some(applied.remote_id.clone());
            issue.beads_modified_at = Some(applied.modified_at);
            issue.beads_content_hash = Some(new_hash.to_string());
        }
        TrackerSource::Scheduled => {}
    }
}

/// Update the existing counterpart, or create one. A `Conflict` (409
/// "already exists") on create is treated as success and resolved by a
/// re-read, per the tracker clients' best-effort-idempotent contract
/// (§4.1).
async fn apply_target(
    client: &dyn TrackerClient,
    project_remote_id: Option<String>,
    existing_remote_id: Option<&str>,
    fields: IssueFields,
) -> Result<RemoteIssue, SyncError> {
    if let Some(remote_id) = existing_remote_id {
        return client.update_issue(remote_id, &fields).await;
    }
    let project_remote_id = project_remote_id
        .ok_or_else(|| SyncError::Validation("missing project remote id to create a counterpart".into()))?;
    match client.create_issue(&project_remote_id, &fields).await {
        Ok(created) => Ok(created),
        Err(SyncError::Conflict(_)) => {
            let title = fields.title.clone().unwrap_or_default();
            let issues = client.list_issues(&project_remote_id, None).await?;
            issues
                .into_iter()
                .find(|i| i.title == title)
                .ok_or_else(|| SyncError::Conflict(format!("create conflicted but no issue titled {title:?} was found")))
        }
        Err(other) => Err(other),
    }
}
