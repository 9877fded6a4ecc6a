use async_trait::async_trait;

/// External change sinks (C9) — best-effort hooks invoked after a
/// successful `SingleIssueSync` or `ProjectSync` (§4.9). Every
/// implementation must never block the calling workflow past its own
/// short timeout and must never surface an error to it; callers treat a
/// sink as fire-and-forget.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// An issue finished syncing. `project_identifier`/`issue_identifier`
    /// are the mapping store's own keys, not any tracker's remote id.
    async fn notify_issue_synced(&self, project_identifier: &str, issue_identifier: &str);

    /// A full project sweep finished syncing.
    async fn notify_project_synced(&self, project_identifier: &str);
}

/// Drops every notification. Used for `DRY_RUN`/tests where no sink is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl ChangeSink for NoopSink {
    async fn notify_issue_synced(&self, _project_identifier: &str, _issue_identifier: &str) {}
    async fn notify_project_synced(&self, _project_identifier: &str) {}
}

/// Fans a notification out to every configured sink concurrently,
/// independent of whether any individual sink fails (§4.9: sink failures
/// "must never fail sync").
#[derive(Clone)]
pub struct CompositeSink {
    sinks: Vec<std::sync::Arc<dyn ChangeSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn ChangeSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ChangeSink for CompositeSink {
    async fn notify_issue_synced(&self, project_identifier: &str, issue_identifier: &str) {
        let futures = self
            .sinks
            .iter()
            .map(|sink| sink.notify_issue_synced(project_identifier, issue_identifier));
        futures_util::future::join_all(futures).await;
    }

    async fn notify_project_synced(&self, project_identifier: &str) {
        let futures = self.sinks.iter().map(|sink| sink.notify_project_synced(project_identifier));
        futures_util::future::join_all(futures).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_sink_never_panics() {
        let sink = NoopSink;
        sink.notify_issue_synced("PROJ", "PROJ-1").await;
        sink.notify_project_synced("PROJ").await;
    }

    #[tokio::test]
    async fn composite_sink_fans_out_to_all() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        struct CountingSink(Arc<AtomicU32>);

        #[async_trait]
        impl ChangeSink for CountingSink {
            async fn notify_issue_synced(&self, _p: &str, _i: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            async fn notify_project_synced(&self, _p: &str) {}
        }

        let counter = Arc::new(AtomicU32::new(0));
        let composite = CompositeSink::new(vec![
            Arc::new(CountingSink(counter.clone())),
            Arc::new(CountingSink(counter.clone())),
        ]);
        composite.notify_issue_synced("PROJ", "PROJ-1").await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
