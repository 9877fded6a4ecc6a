use concord_core::error::SyncError;
use concord_core::types::{Issue, TrackerSource};

use crate::context::WorkflowContext;

/// What reconciliation decided to do with one mapping row (§4.6.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationAction {
    /// Every tracker the mapping referenced still has the issue — nothing
    /// to do.
    NoAction,
    /// At least one side's counterpart is gone, but not all — soft-delete
    /// that side's flag, keep the row.
    MarkDeleted { issue_identifier: String, stale: Vec<TrackerSource> },
    /// No tracker has a live counterpart left — remove the row entirely.
    HardDelete { issue_identifier: String },
}

/// Result of one `DataReconciliation` pass over a project's mappings
/// (§4.6.5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    pub project_identifier: String,
    pub checked: u32,
    pub stale_vibe: Vec<String>,
    pub stale_beads: Vec<String>,
    pub actions: Vec<ReconciliationAction>,
    pub dry_run: bool,
}

/// Verify every mapping row in `project_identifier` still has a live
/// counterpart in each tracker it references, by attempting `GetIssue`
/// against each referenced remote id. A tracker call that errors with
/// anything other than `NotFound` (transient outage, auth failure) leaves
/// that side's mapping alone — reconciliation only acts on confirmed
/// absence, never on uncertainty. In `dry_run` mode the decided actions are
/// reported but never applied.
pub async fn data_reconciliation(
    ctx: &WorkflowContext,
    project_identifier: &str,
) -> Result<ReconciliationOutcome, SyncError> {
    let issues = ctx
        .store
        .list_issues_by_project(project_identifier)
        .await
        .map_err(SyncError::from)?;

    let mut outcome = ReconciliationOutcome {
        project_identifier: project_identifier.to_string(),
        dry_run: ctx.dry_run,
        ..Default::default()
    };

    for issue in issues {
        outcome.checked += 1;
        let stale = stale_sides(ctx, project_identifier, &issue).await;

        if stale.is_empty() {
            outcome.actions.push(ReconciliationAction::NoAction);
            continue;
        }

        for source in &stale {
            match source {
                TrackerSource::Vibe => outcome.stale_vibe.push(issue.identifier.clone()),
                TrackerSource::Beads => outcome.stale_beads.push(issue.identifier.clone()),
                TrackerSource::Huly | TrackerSource::Scheduled => {}
            }
        }

        let referenced = referenced_sources(&issue);
        let action = if stale.len() == referenced.len() {
            ReconciliationAction::HardDelete {
                issue_identifier: issue.identifier.clone(),
            }
        } else {
            ReconciliationAction::MarkDeleted {
                issue_identifier: issue.identifier.clone(),
                stale: stale.clone(),
            }
        };

        if !ctx.dry_run {
            apply(ctx, project_identifier, &action).await?;
        }
        outcome.actions.push(action);
    }

    Ok(outcome)
}

/// Every tracker source this mapping claims a counterpart in.
fn referenced_sources(issue: &Issue) -> Vec<TrackerSource> {
    let mut sources = Vec::new();
    if issue.huly_id.is_some() {
        sources.push(TrackerSource::Huly);
    }
    if issue.vibe_id.is_some() {
        sources.push(TrackerSource::Vibe);
    }
    if issue.beads_id.is_some() {
        sources.push(TrackerSource::Beads);
    }
    sources
}

/// Which of `issue`'s referenced counterparts no longer exist in their
/// tracker, confirmed via a direct `GetIssue` call.
async fn stale_sides(ctx: &WorkflowContext, project_identifier: &str, issue: &Issue) -> Vec<TrackerSource> {
    let mut stale = Vec::new();
    for (source, remote_id) in [
        (TrackerSource::Huly, &issue.huly_id),
        (TrackerSource::Vibe, &issue.vibe_id),
        (TrackerSource::Beads, &issue.beads_id),
    ] {
        let Some(remote_id) = remote_id else { continue };
        let Ok(client) = ctx.trackers.get(source, project_identifier) else { continue };
        match client.get_issue(remote_id).await {
            Err(SyncError::NotFound(_)) => stale.push(source),
            Ok(remote) if remote.deleted => stale.push(source),
            Ok(_) | Err(_) => {}
        }
    }
    stale
}

async fn apply(ctx: &WorkflowContext, project_identifier: &str, action: &ReconciliationAction) -> Result<(), SyncError> {
    match action {
        ReconciliationAction::NoAction => Ok(()),
        ReconciliationAction::MarkDeleted { issue_identifier, .. } => ctx
            .store
            .mark_issue_deleted(project_identifier, issue_identifier)
            .await
            .map_err(SyncError::from),
        ReconciliationAction::HardDelete { issue_identifier } => ctx
            .store
            .hard_delete_issue(project_identifier, issue_identifier)
            .await
            .map_err(SyncError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_sources_lists_only_present_ids() {
        let mut issue = Issue::new("PROJ-1", "PROJ");
        issue.huly_id = Some("h1".into());
        issue.beads_id = Some("b1".into());
        let sources = referenced_sources(&issue);
        assert_eq!(sources, vec![TrackerSource::Huly, TrackerSource::Beads]);
    }

    #[test]
    fn no_action_leaves_stale_lists_empty() {
        let outcome = ReconciliationOutcome {
            project_identifier: "PROJ".into(),
            ..Default::default()
        };
        assert!(outcome.stale_vibe.is_empty());
        assert!(outcome.stale_beads.is_empty());
        assert_eq!(outcome.actions.len(), 0);
    }
}
