use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use concord_core::types::{Issue, TrackerSource};
use concord_detectors::decode_webhook_payload;
use concord_runtime::WorkflowId;
use serde::Serialize;
use tracing::{info, warn};

use crate::state::BridgeState;

/// Response shape for `POST /webhook` (§6): `{success, processed, skipped,
/// errors?}`.
#[derive(Debug, Default, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub processed: u32,
    pub skipped: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// `POST /webhook` — decode a Huly webhook payload into normalized changes
/// and run `SingleIssueSync` for each one, coalescing duplicate POSTs for
/// the same entity onto a single execution (§4.4 scenario 4: two POSTs 50ms
/// apart for the same entity both report `processed:1`, but only one
/// `SingleIssueSync` actually runs).
pub async fn receive_webhook(State(state): State<Arc<BridgeState>>, body: axum::body::Bytes) -> impl IntoResponse {
    let changes = match decode_webhook_payload(&body) {
        Ok(changes) => changes,
        Err(err) => {
            warn!(error = %err, "rejected malformed webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse {
                    success: false,
                    errors: vec![err.to_string()],
                    ..Default::default()
                }),
            );
        }
    };

    let mut response = WebhookResponse {
        success: true,
        ..Default::default()
    };

    for change in changes {
        let Some(project_identifier) = Issue::project_identifier_of(&change.event.entity_ref) else {
            response.skipped += 1;
            response
                .errors
                .push(format!("cannot resolve project for entity {}", change.event.entity_ref));
            continue;
        };

        let ctx = state.ctx.clone();
        let entity_ref = change.event.entity_ref.clone();
        let project_identifier = project_identifier.to_string();
        let workflow_id = WorkflowId(change.workflow_id.clone());

        let outcome = state
            .executor
            .run(workflow_id, move || async move {
                concord_workflows::single_issue_sync(&ctx, &project_identifier, TrackerSource::Huly, &entity_ref).await
            })
            .await;

        match outcome {
            Ok(outcome) => {
                info!(issue_identifier = %outcome.issue_identifier, "webhook change synced");
                response.processed += 1;
            }
            Err(err) => {
                response.success = false;
                response.errors.push(err.to_string());
            }
        }
    }

    (StatusCode::OK, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use chrono::Utc;
    use concord_core::types::{CanonicalPriority, CanonicalStatus, Project};
    use concord_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
    use concord_store::MappingStore;
    use concord_trackers::client::{IssueFields, RemoteIssue, RemoteProject, TrackerClient};
    use concord_workflows::{Trackers, WorkflowContext};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tower::ServiceExt;

    /// Returns the same `RemoteIssue` on every `get_issue`, counting calls so
    /// coalescing can be asserted (spec scenario 4).
    struct CountingHulyClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TrackerClient for CountingHulyClient {
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
        async fn get_issue(&self, remote_id: &str) -> concord_core::error::Result<RemoteIssue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(RemoteIssue {
                remote_id: remote_id.to_string(),
                identifier: "PROJ-9".to_string(),
                title: "Add retry".to_string(),
                description: String::new(),
                status: CanonicalStatus::Todo,
                priority: CanonicalPriority::Medium,
                parent_remote_id: None,
                modified_at: Utc::now(),
                deleted: false,
            })
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

        let huly = Arc::new(CountingHulyClient { calls: AtomicU32::new(0) });
        let ctx = WorkflowContext {
            store: Arc::new(store),
            trackers: Trackers::new(huly, huly_stub(), |_project| None),
            identity: concord_identity::IdentityResolver::new(),
            sinks: Arc::new(concord_sinks::NoopSink),
            api_delay_ms: 0,
            dry_run: false,
            max_workers: 5,
            project_breakers: Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        };
        BridgeState::new(ctx)
    }

    fn huly_stub() -> Arc<dyn TrackerClient> {
        Arc::new(CountingHulyClient { calls: AtomicU32::new(0) })
    }

    fn router(state: Arc<BridgeState>) -> Router {
        Router::new().route("/webhook", post(receive_webhook)).with_state(state)
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn repeated_posts_for_same_entity_both_succeed() {
        let state = test_state().await;
        let body = br#"{"type":"issue","changes":[{"entity":"issue","id":"PROJ-9","kind":"update"}]}"#;

        let app = router(state.clone());
        let first = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.as_slice()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let app = router(state);
        let second = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.as_slice()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn concurrent_posts_for_same_entity_coalesce_onto_one_sync() {
        let state = test_state().await;
        let body = br#"{"type":"issue","changes":[{"entity":"issue","id":"PROJ-9","kind":"update"}]}"#;

        let first = router(state.clone()).oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(body.as_slice()))
                .unwrap(),
        );
        let second = router(state.clone()).oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(body.as_slice()))
                .unwrap(),
        );

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.unwrap().status(), StatusCode::OK);
        assert_eq!(second.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn entity_without_a_project_prefix_is_skipped() {
        let app = router(test_state().await);
        let body = br#"{"type":"issue","changes":[{"entity":"issue","id":"NODASH","kind":"update"}]}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.as_slice()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["skipped"], 1);
        assert_eq!(json["processed"], 0);
    }
}
