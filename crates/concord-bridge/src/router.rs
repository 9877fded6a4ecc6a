use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use concord_telemetry::global_metrics;
use concord_telemetry::middleware::metrics_middleware;

use crate::state::BridgeState;
use crate::webhook::receive_webhook;

/// Build the bridge's HTTP surface (§6): the webhook receiver plus a
/// `/metrics` endpoint for the internal observability the ambient stack
/// still carries (§10.2, §10.7) — no management UI, no SSE fan-out, those
/// stay out of scope.
pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .with_state(state)
}

async fn metrics_handler() -> impl IntoResponse {
    (StatusCode::OK, global_metrics().export_prometheus())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use concord_core::types::Project;
    use concord_identity::IdentityResolver;
    use concord_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
    use concord_store::MappingStore;
    use concord_trackers::client::{IssueFields, RemoteIssue, RemoteProject, TrackerClient};
    use concord_workflows::{Trackers, WorkflowContext};
    use tower::ServiceExt;

    struct NullClient;
    #[async_trait::async_trait]
    impl TrackerClient for NullClient {
        async fn health_check(&self) -> concord_core::error::Result<()> {
            Ok(())
        }
        async fn list_projects(&self) -> concord_core::error::Result<Vec<RemoteProject>> {
            Ok(Vec::new())
        }
        async fn get_project(&self, _remote_id: &str) -> concord_core::error::Result<RemoteProject> {
            Err(concord_core::error::SyncError::NotFound("n/a".into()))
        }
        async fn list_issues(&self, _p: &str, _c: Option<&str>) -> concord_core::error::Result<Vec<RemoteIssue>> {
            Ok(Vec::new())
        }
        async fn get_issue(&self, _remote_id: &str) -> concord_core::error::Result<RemoteIssue> {
            Err(concord_core::error::SyncError::NotFound("n/a".into()))
        }
        async fn create_issue(&self, _p: &str, _f: &IssueFields) -> concord_core::error::Result<RemoteIssue> {
            Err(concord_core::error::SyncError::NotFound("n/a".into()))
        }
        async fn update_issue(&self, _id: &str, _f: &IssueFields) -> concord_core::error::Result<RemoteIssue> {
            Err(concord_core::error::SyncError::NotFound("n/a".into()))
        }
        async fn delete_issue(&self, _id: &str) -> concord_core::error::Result<()> {
            Ok(())
        }
    }

    async fn test_state() -> Arc<BridgeState> {
        let store = MappingStore::new_in_memory().await.unwrap();
        store.upsert_project(&Project::new("PROJ")).await.unwrap();
        let ctx = WorkflowContext {
            store: Arc::new(store),
            trackers: Trackers::new(Arc::new(NullClient), Arc::new(NullClient), |_| None),
            identity: IdentityResolver::new(),
            sinks: Arc::new(concord_sinks::NoopSink),
            api_delay_ms: 0,
            dry_run: false,
            max_workers: 5,
            project_breakers: Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        };
        BridgeState::new(ctx)
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_text() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
