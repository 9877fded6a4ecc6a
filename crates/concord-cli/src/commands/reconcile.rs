use clap::ValueEnum;
use concord_workflows::{ReconciliationAction, WorkflowContext};
use tracing::{info, warn};

/// Which kind of decided action `--action` restricts application to,
/// leaving the other kind reported but not applied — a safety valve for
/// the cascade-vs-soft-delete question in the reconciliation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionFilter {
    MarkDeleted,
    HardDelete,
}

/// `concord reconcile [--dry-run] [--action=...]` (§6, §4.6.5): run
/// `DataReconciliation` over every active project, optionally restricting
/// which decided action kind is actually applied.
pub async fn run(ctx: &WorkflowContext, dry_run: bool, action: Option<ActionFilter>) -> anyhow::Result<()> {
    let cache_expiry = chrono::Duration::zero();
    let projects = ctx
        .store
        .get_projects_to_sync(cache_expiry, Default::default())
        .await?;

    let mut total_checked = 0u32;
    let mut total_applied = 0u32;
    let mut total_reported = 0u32;

    for project in projects {
        let scoped_ctx = WorkflowContext {
            dry_run: true,
            ..ctx.clone()
        };
        let outcome = concord_workflows::data_reconciliation(&scoped_ctx, &project.identifier).await?;
        total_checked += outcome.checked;

        for decided in &outcome.actions {
            let kind = match decided {
                ReconciliationAction::NoAction => continue,
                ReconciliationAction::MarkDeleted { .. } => ActionFilter::MarkDeleted,
                ReconciliationAction::HardDelete { .. } => ActionFilter::HardDelete,
            };
            total_reported += 1;
            if let Some(wanted) = action {
                if wanted != kind {
                    continue;
                }
            }
            if dry_run {
                info!(project_identifier = %project.identifier, action = ?decided, "would apply (dry run)");
                continue;
            }
            match apply(ctx, &project.identifier, decided).await {
                Ok(()) => total_applied += 1,
                Err(err) => warn!(project_identifier = %project.identifier, error = %err, "failed to apply reconciliation action"),
            }
        }
    }

    info!(total_checked, total_reported, total_applied, dry_run, "reconciliation complete");
    Ok(())
}

async fn apply(ctx: &WorkflowContext, project_identifier: &str, action: &ReconciliationAction) -> anyhow::Result<()> {
    match action {
        ReconciliationAction::NoAction => Ok(()),
        ReconciliationAction::MarkDeleted { issue_identifier, .. } => Ok(ctx
            .store
            .mark_issue_deleted(project_identifier, issue_identifier)
            .await?),
        ReconciliationAction::HardDelete { issue_identifier } => {
            Ok(ctx.store.hard_delete_issue(project_identifier, issue_identifier).await?)
        }
    }
}
