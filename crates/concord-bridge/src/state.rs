use std::sync::Arc;

use concord_runtime::WorkflowExecutor;
use concord_workflows::{SingleIssueSyncOutcome, WorkflowContext};

/// Shared state behind every bridge route: the workflow context every sync
/// activity needs, and the executor that coalesces concurrent webhook POSTs
/// for the same entity onto one `SingleIssueSync` run (§4.4, §4.5).
pub struct BridgeState {
    pub ctx: WorkflowContext,
    pub executor: Arc<WorkflowExecutor<SingleIssueSyncOutcome>>,
}

impl BridgeState {
    pub fn new(ctx: WorkflowContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            executor: Arc::new(WorkflowExecutor::new()),
        })
    }
}
