use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::sink::ChangeSink;

/// Requests are allowed at most this long before the sink gives up and logs
/// (§4.9: "must have short timeouts (≤5s)").
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Fire-and-forget memory-update notifier for the Huly-PM assistant
/// platform, grounded on `at_intelligence::memory::MemoryEntry`'s shape —
/// concord has no business modeling Letta's own memory categories, so it
/// sends a minimal key/value/source update and lets Letta interpret it.
#[derive(Debug, Clone)]
pub struct LettaSink {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, serde::Serialize)]
struct MemoryUpdateRequest<'a> {
    key: &'a str,
    value: &'a str,
    source: &'a str,
}

impl LettaSink {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client builds"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_memory(&self, body: MemoryUpdateRequest<'_>) {
        let mut req = self.http.post(self.url("/memory-blocks")).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Err(err) = req.send().await {
            warn!(%err, "letta sink request failed, ignoring");
        }
    }
}

#[async_trait]
impl ChangeSink for LettaSink {
    async fn notify_issue_synced(&self, project_identifier: &str, issue_identifier: &str) {
        self.post_memory(MemoryUpdateRequest {
            key: issue_identifier,
            value: "synced",
            source: project_identifier,
        })
        .await;
    }

    async fn notify_project_synced(&self, project_identifier: &str) {
        self.post_memory(MemoryUpdateRequest {
            key: project_identifier,
            value: "project_synced",
            source: project_identifier,
        })
        .await;
    }
}
