use concord_workflows::WorkflowContext;
use tracing::info;

/// `concord sync [project]` (§6): trigger one `FullOrchestration` sweep, or
/// `ProjectSync` for a single named/foldered project when given.
pub async fn run(ctx: &WorkflowContext, project: Option<&str>) -> anyhow::Result<()> {
    match project {
        None => {
            let outcome = concord_workflows::full_orchestration(ctx).await?;
            info!(
                sync_run_id = %outcome.sync_run_id,
                projects_processed = outcome.projects_processed,
                projects_failed = outcome.projects_failed,
                projects_skipped_open_circuit = outcome.projects_skipped_open_circuit,
                issues_synced = outcome.issues_synced,
                "full orchestration complete"
            );
            if outcome.projects_failed > 0 {
                for err in &outcome.errors {
                    tracing::warn!(error = %err, "project sync error");
                }
            }
        }
        Some(name_or_folder) => {
            let outcome = concord_workflows::single_project_orchestration(ctx, name_or_folder).await?;
            info!(
                project_identifier = %outcome.project_identifier,
                issues_synced = outcome.issues_synced,
                issues_failed = outcome.issues_failed,
                "project sync complete"
            );
            if outcome.issues_failed > 0 {
                for err in &outcome.errors {
                    tracing::warn!(error = %err, "issue sync error");
                }
            }
        }
    }
    Ok(())
}
