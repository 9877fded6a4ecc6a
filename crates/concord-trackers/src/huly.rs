use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concord_core::error::{Result, SyncError};
use concord_core::mapping::{priority_from_huly, priority_to_huly, status_from_huly, status_to_huly};
use concord_core::types::{CanonicalPriority, CanonicalStatus};
use concord_resilience::RateLimiter;
use concord_runtime::{retry_with_backoff, RetryPolicy};
use serde::Deserialize;
use std::sync::Arc;

use crate::client::{classify_http_status, IssueFields, RemoteIssue, RemoteProject, TrackerClient};

/// HTTP JSON client for the Huly project-management server (§4.1). Cursor
/// based incremental listing when the server reports one, falling back to
/// `modifiedSince`.
#[derive(Debug, Clone)]
pub struct HulyClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct HulyProjectDto {
    id: String,
    identifier: String,
    name: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HulyIssueDto {
    id: String,
    identifier: String,
    title: String,
    #[serde(default)]
    description: String,
    status: String,
    priority: String,
    #[serde(default)]
    parent_id: Option<String>,
    modified_at: DateTime<Utc>,
    #[serde(default)]
    deleted: bool,
}

impl HulyClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            http: reqwest::Client::builder()
                .pool_max_idle_per_host(50)
                .pool_idle_timeout(std::time::Duration::from_secs(60))
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("reqwest client builds"),
            limiter,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Issues one HTTP call, retried under [`RetryPolicy::default`] while the
    /// failure stays transient (network errors, 5xx, 429) — the workflow
    /// layer treats this whole method as a single at-least-once activity
    /// (§4.5). Rate limiting happens inside each attempt so a retry after a
    /// 429 waits its turn at the bucket like any other call.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let url = self.url(path);
        retry_with_backoff(RetryPolicy::default(), || {
            let method = method.clone();
            let url = url.clone();
            let body = body.clone();
            async move {
                self.limiter.acquire("huly").await?;

                let mut req = self.http.request(method, url).bearer_auth(&self.token);
                if let Some(body) = body {
                    req = req.json(&body);
                }

                let resp = req.send().await.map_err(|e| SyncError::Transient(e.to_string()))?;
                let status = resp.status();
                let text = resp.text().await.map_err(|e| SyncError::Transient(e.to_string()))?;

                if !status.is_success() {
                    return Err(classify_http_status(status.as_u16(), text));
                }
                if text.is_empty() {
                    return Ok(serde_json::Value::Null);
                }
                serde_json::from_str(&text).map_err(|e| SyncError::Validation(format!("malformed Huly response: {e}")))
            }
        })
        .await
    }

    fn project_from_dto(dto: HulyProjectDto) -> RemoteProject {
        RemoteProject {
            remote_id: dto.id,
            identifier: dto.identifier,
            name: dto.name,
            description: dto.description,
        }
    }

    fn issue_from_dto(dto: HulyIssueDto) -> RemoteIssue {
        RemoteIssue {
            remote_id: dto.id,
            identifier: dto.identifier,
            title: dto.title,
            description: dto.description,
            status: status_from_huly(&dto.status),
            priority: priority_from_huly(&dto.priority),
            parent_remote_id: dto.parent_id,
            modified_at: dto.modified_at,
            deleted: dto.deleted,
        }
    }

    fn fields_to_json(fields: &IssueFields) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(title) = &fields.title {
            map.insert("title".into(), serde_json::Value::String(title.clone()));
        }
        if let Some(description) = &fields.description {
            map.insert("description".into(), serde_json::Value::String(description.clone()));
        }
        if let Some(status) = fields.status {
            map.insert("status".into(), serde_json::Value::String(status_to_huly(status).into()));
        }
        if let Some(priority) = fields.priority {
            map.insert("priority".into(), serde_json::Value::String(priority_to_huly(priority).into()));
        }
        if let Some(parent) = &fields.parent_remote_id {
            map.insert("parentId".into(), serde_json::Value::String(parent.clone()));
        }
        serde_json::Value::Object(map)
    }
}

#[async_trait]
impl TrackerClient for HulyClient {
    async fn health_check(&self) -> Result<()> {
        self.request(reqwest::Method::GET, "/api/health", None).await?;
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        let body = self.request(reqwest::Method::GET, "/api/projects", None).await?;
        let dtos: Vec<HulyProjectDto> =
            serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(dtos.into_iter().map(Self::project_from_dto).collect())
    }

    async fn get_project(&self, remote_id: &str) -> Result<RemoteProject> {
        let body = self
            .request(reqwest::Method::GET, &format!("/api/projects/{remote_id}"), None)
            .await?;
        let dto: HulyProjectDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(Self::project_from_dto(dto))
    }

    async fn list_issues(&self, project_remote_id: &str, since_cursor: Option<&str>) -> Result<Vec<RemoteIssue>> {
        let path = match since_cursor {
            Some(cursor) => format!("/api/projects/{project_remote_id}/issues?cursor={cursor}"),
            None => format!("/api/projects/{project_remote_id}/issues"),
        };
        let body = self.request(reqwest::Method::GET, &path, None).await?;
        let dtos: Vec<HulyIssueDto> = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(dtos.into_iter().map(Self::issue_from_dto).collect())
    }

    async fn get_issue(&self, remote_id: &str) -> Result<RemoteIssue> {
        let body = self
            .request(reqwest::Method::GET, &format!("/api/issues/{remote_id}"), None)
            .await?;
        let dto: HulyIssueDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(Self::issue_from_dto(dto))
    }

    async fn create_issue(&self, project_remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue> {
        let mut payload = Self::fields_to_json(fields);
        payload["projectId"] = serde_json::Value::String(project_remote_id.to_string());
        match self
            .request(reqwest::Method::POST, "/api/issues", Some(payload))
            .await
        {
            Ok(body) => {
                let dto: HulyIssueDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
                Ok(Self::issue_from_dto(dto))
            }
            // Best-effort idempotent create (§4.1): treat "already exists" as
            // success and resolve by re-reading, rather than failing the sync.
            Err(SyncError::Conflict(_)) => {
                let title = fields.title.clone().unwrap_or_default();
                let existing = self
                    .list_issues(project_remote_id, None)
                    .await?
                    .into_iter()
                    .find(|i| i.title == title)
                    .ok_or_else(|| SyncError::Conflict(format!("issue already exists but could not be re-read: {title}")))?;
                Ok(existing)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_issue(&self, remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue> {
        let payload = Self::fields_to_json(fields);
        let body = self
            .request(reqwest::Method::PATCH, &format!("/api/issues/{remote_id}"), Some(payload))
            .await?;
        let dto: HulyIssueDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(Self::issue_from_dto(dto))
    }

    async fn delete_issue(&self, remote_id: &str) -> Result<()> {
        self.request(reqwest::Method::DELETE, &format!("/api/issues/{remote_id}"), None)
            .await?;
        Ok(())
    }

    async fn create_sub_issue(&self, parent_remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue> {
        let mut fields = fields.clone();
        fields.parent_remote_id = Some(parent_remote_id.to_string());
        let mut payload = Self::fields_to_json(&fields);
        payload["parentId"] = serde_json::Value::String(parent_remote_id.to_string());
        let body = self
            .request(reqwest::Method::POST, "/api/issues", Some(payload))
            .await?;
        let dto: HulyIssueDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(Self::issue_from_dto(dto))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_resilience::RateLimitConfig;

    fn client() -> HulyClient {
        HulyClient::new(
            "https://huly.example.com",
            "test-token",
            Arc::new(RateLimiter::new(RateLimitConfig::per_second(100))),
        )
    }

    #[test]
    fn url_joins_base_and_path() {
        let c = client();
        assert_eq!(c.url("/api/health"), "https://huly.example.com/api/health");
    }

    #[test]
    fn fields_to_json_includes_only_set_fields() {
        let fields = IssueFields {
            title: Some("New title".into()),
            ..IssueFields::default()
        };
        let json = HulyClient::fields_to_json(&fields);
        assert_eq!(json["title"], "New title");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn fields_to_json_maps_status_and_priority() {
        let fields = IssueFields {
            status: Some(CanonicalStatus::Done),
            priority: Some(CanonicalPriority::Urgent),
            ..IssueFields::default()
        };
        let json = HulyClient::fields_to_json(&fields);
        assert_eq!(json["status"], "Done");
        assert_eq!(json["priority"], "Urgent");
    }
}
