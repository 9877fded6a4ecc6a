use std::sync::Arc;
use std::time::Duration;

use concord_core::config::Config;
use concord_detectors::{BeadsWatcher, VibeEventStream};
use concord_runtime::{ShutdownGuard, ShutdownSignal, WorkflowExecutor};
use concord_workflows::{scheduled_sync, ProjectSyncOutcome, ScheduledSyncOptions, SingleIssueSyncOutcome, WorkflowContext};
use tracing::{info, warn};

use crate::wiring::project_identifier_from_repo_path;

/// `concord run` (§6): start every long-lived component — the scheduled
/// orchestrator, the Vibe SSE dispatcher, the Beads filesystem watcher, and
/// the webhook bridge HTTP server — and drive them until SIGINT/SIGTERM,
/// then wait for each to confirm it drained (§4.5, §10.6).
pub async fn run(config: &Config, ctx: WorkflowContext) -> anyhow::Result<()> {
    let shutdown = ShutdownSignal::new();
    let issue_executor = Arc::new(WorkflowExecutor::<SingleIssueSyncOutcome>::new());
    let project_executor = Arc::new(WorkflowExecutor::<ProjectSyncOutcome>::new());
    let mut components = 0usize;

    let scheduled_handle = {
        let ctx = ctx.clone();
        let shutdown = shutdown.clone();
        let options = ScheduledSyncOptions {
            interval: Duration::from_millis(config.sync.interval_ms),
            max_iterations: None,
        };
        components += 1;
        tokio::spawn(async move {
            let guard = ShutdownGuard::new(shutdown.clone());
            let summary = scheduled_sync(&ctx, options, &shutdown).await;
            info!(
                iterations = summary.iterations,
                projects_processed = summary.projects_processed,
                issues_synced = summary.issues_synced,
                "scheduled sync loop stopped"
            );
            drop(guard);
        })
    };

    let vibe_handle = if let (Some(base_url), Some(token)) = (&config.vibe.base_url, &config.vibe.token) {
        let ctx = ctx.clone();
        let executor = issue_executor.clone();
        let shutdown = shutdown.clone();
        let mut stream = VibeEventStream::new(base_url.clone(), token.clone());
        components += 1;
        Some(tokio::spawn(async move {
            let guard = ShutdownGuard::new(shutdown.clone());
            let (tx, rx) = flume::unbounded();
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = stream.run(tx) => {}
                _ = drain_vibe_events(&ctx, &executor, rx) => {}
                _ = shutdown_rx.recv() => {}
            }
            drop(guard);
        }))
    } else {
        info!("vibe base_url/token not configured, skipping event stream dispatcher");
        None
    };

    let beads_handle = if config.beads.repo_paths.is_empty() {
        info!("no beads.repo_paths configured, skipping filesystem watcher");
        None
    } else {
        match spawn_beads_watcher(config, ctx.clone(), project_executor.clone(), shutdown.clone()) {
            Ok(handle) => {
                components += 1;
                Some(handle)
            }
            Err(err) => {
                warn!(error = %err, "failed to start beads filesystem watcher, continuing without it");
                None
            }
        }
    };

    let bridge_handle = {
        let state = concord_bridge::BridgeState::new(ctx.clone());
        let app = concord_bridge::router(state);
        let addr = format!("{}:{}", config.bridge.host, config.bridge.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "webhook bridge listening");
        let shutdown = shutdown.clone();
        components += 1;
        tokio::spawn(async move {
            let guard = ShutdownGuard::new(shutdown.clone());
            let mut shutdown_rx = shutdown.subscribe();
            let serve = axum::serve(listener, app);
            tokio::select! {
                result = serve => {
                    if let Err(err) = result {
                        warn!(error = %err, "bridge server exited with an error");
                    }
                }
                _ = shutdown_rx.recv() => {}
            }
            drop(guard);
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install ctrl-c handler");
    }
    info!("received interrupt, shutting down");
    shutdown.trigger();

    let mut shutdown = shutdown;
    let drain = shutdown.wait_for_drain(components, Duration::from_secs(30)).await;
    if !drain.is_complete() {
        warn!("not every component confirmed drain before timeout");
    }

    let _ = scheduled_handle.await;
    if let Some(handle) = vibe_handle {
        let _ = handle.await;
    }
    if let Some(handle) = beads_handle {
        let _ = handle.await;
    }
    let _ = bridge_handle.await;

    Ok(())
}

/// Consume Vibe SSE change frames as they arrive, resolving each one's
/// project via the existing mapping (a task not yet mapped to any project
/// is left for the next `FullOrchestration` sweep to discover) before
/// running `SingleIssueSync` through the shared executor.
async fn drain_vibe_events(
    ctx: &WorkflowContext,
    executor: &Arc<WorkflowExecutor<SingleIssueSyncOutcome>>,
    rx: flume::Receiver<concord_core::types::ChangeEvent>,
) {
    while let Ok(event) = rx.recv_async().await {
        let vibe_id = event.entity_ref.clone();
        let mapped = match ctx.store.find_issue_by_vibe_id(&vibe_id).await {
            Ok(mapped) => mapped,
            Err(err) => {
                warn!(vibe_id = %vibe_id, error = %err, "failed to look up vibe mapping");
                continue;
            }
        };
        let Some(issue) = mapped else {
            info!(vibe_id = %vibe_id, "vibe change for an unmapped task, deferring to scheduled sync");
            continue;
        };

        let workflow_id = concord_runtime::WorkflowId(format!("vibe-stream-{vibe_id}"));
        let ctx = ctx.clone();
        let project_identifier = issue.project_identifier.clone();
        let outcome = executor
            .run(workflow_id, move || async move {
                concord_workflows::single_issue_sync(&ctx, &project_identifier, concord_core::types::TrackerSource::Vibe, &vibe_id).await
            })
            .await;
        match outcome {
            Ok(outcome) => info!(issue_identifier = %outcome.issue_identifier, "vibe change synced"),
            Err(err) => warn!(error = %err, "vibe change sync failed"),
        }
    }
}

fn spawn_beads_watcher(
    config: &Config,
    ctx: WorkflowContext,
    executor: Arc<WorkflowExecutor<ProjectSyncOutcome>>,
    shutdown: ShutdownSignal,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let mut watcher = BeadsWatcher::new()?;
    for repo_path in &config.beads.repo_paths {
        let identifier = project_identifier_from_repo_path(repo_path);
        watcher.watch_project(std::path::Path::new(repo_path), &identifier)?;
    }

    Ok(tokio::spawn(async move {
        let guard = ShutdownGuard::new(shutdown.clone());
        let mut shutdown_rx = shutdown.subscribe();
        let mut poll = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    for event in watcher.poll_events() {
                        dispatch_beads_event(&ctx, &executor, event.entity_ref).await;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        drop(guard);
    }))
}

/// A stable Beads filesystem event names the *project*, not a single
/// issue — the watcher only knows `issues.jsonl` changed, not which line —
/// so it coalesces onto a `ProjectSync` for that project rather than a
/// `SingleIssueSync`.
async fn dispatch_beads_event(
    ctx: &WorkflowContext,
    executor: &Arc<WorkflowExecutor<ProjectSyncOutcome>>,
    project_identifier: String,
) {
    let workflow_id = concord_runtime::WorkflowId(format!("beads-watch-{project_identifier}"));
    let ctx = ctx.clone();
    let outcome = executor
        .run(workflow_id, move || async move { concord_workflows::project_sync(&ctx, &project_identifier).await })
        .await;
    match outcome {
        Ok(outcome) => info!(project_identifier = %outcome.project_identifier, issues_synced = outcome.issues_synced, "beads change synced"),
        Err(err) => warn!(error = %err, "beads change sync failed"),
    }
}
