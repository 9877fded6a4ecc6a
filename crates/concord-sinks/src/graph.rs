use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::sink::ChangeSink;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Fire-and-forget summary-update notifier for the code-perception graph
/// store, mirroring `LettaSink`'s request/timeout shape.
#[derive(Debug, Clone)]
pub struct GraphStoreSink {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, serde::Serialize)]
struct SummaryUpdateRequest<'a> {
    project_identifier: &'a str,
    issue_identifier: Option<&'a str>,
}

impl GraphStoreSink {
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

    async fn post_summary(&self, body: SummaryUpdateRequest<'_>) {
        let mut req = self.http.post(self.url("/summaries")).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Err(err) = req.send().await {
            warn!(%err, "graph store sink request failed, ignoring");
        }
    }
}

#[async_trait]
impl ChangeSink for GraphStoreSink {
    async fn notify_issue_synced(&self, project_identifier: &str, issue_identifier: &str) {
        self.post_summary(SummaryUpdateRequest {
            project_identifier,
            issue_identifier: Some(issue_identifier),
        })
        .await;
    }

    async fn notify_project_synced(&self, project_identifier: &str) {
        self.post_summary(SummaryUpdateRequest {
            project_identifier,
            issue_identifier: None,
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_never_panics() {
        let sink = GraphStoreSink::new("http://127.0.0.1:1", None);
        sink.notify_issue_synced("PROJ", "PROJ-1").await;
        sink.notify_project_synced("PROJ").await;
    }
}
