use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concord_core::error::{Result, SyncError};
use concord_core::mapping::{priority_from_vibe, priority_to_vibe, status_from_vibe, status_to_vibe};
use concord_resilience::RateLimiter;
use concord_runtime::{retry_with_backoff, RetryPolicy};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::client::{classify_http_status, IssueFields, RemoteIssue, RemoteProject, TrackerClient};

/// HTTP JSON client for the Vibe kanban/task-execution platform (§4.1).
/// Tasks carry a Huly reference by convention embedded in the description;
/// the identity resolver (C3) reads it back out via [`extract_huly_tag`].
#[derive(Debug, Clone)]
pub struct VibeClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct VibeProjectDto {
    id: String,
    identifier: String,
    name: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VibeTaskDto {
    id: String,
    identifier: String,
    title: String,
    #[serde(default)]
    description: String,
    status: String,
    priority: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    archived: bool,
}

fn huly_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:Huly Issue|Synced from Huly):\s*([A-Za-z0-9]+-\d+)").expect("valid regex")
    })
}

/// Pulls the `Huly Issue: PROJ-N` / `Synced from Huly: PROJ-N` tag out of a
/// Vibe task description (§4.1, §4.3 fallback #2).
pub fn extract_huly_tag(description: &str) -> Option<String> {
    huly_tag_pattern()
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Appends (or replaces) the Huly back-reference tag in a task description.
pub fn with_huly_tag(description: &str, huly_identifier: &str) -> String {
    if extract_huly_tag(description).is_some() {
        huly_tag_pattern()
            .replace(description, format!("Huly Issue: {huly_identifier}"))
            .into_owned()
    } else if description.is_empty() {
        format!("Huly Issue: {huly_identifier}")
    } else {
        format!("{description}\n\nHuly Issue: {huly_identifier}")
    }
}

impl VibeClient {
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

    pub fn stream_url(&self) -> String {
        format!("{}/api/events/stream", self.base_url.trim_end_matches('/'))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Issues one HTTP call, retried under [`RetryPolicy::default`] while the
    /// failure stays transient (network errors, 5xx, 429) — the workflow
    /// layer treats this whole method as a single at-least-once activity
    /// (§4.5).
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
                self.limiter.acquire("vibe").await?;

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
                serde_json::from_str(&text).map_err(|e| SyncError::Validation(format!("malformed Vibe response: {e}")))
            }
        })
        .await
    }

    fn project_from_dto(dto: VibeProjectDto) -> RemoteProject {
        RemoteProject {
            remote_id: dto.id,
            identifier: dto.identifier,
            name: dto.name,
            description: dto.description,
        }
    }

    fn issue_from_dto(dto: VibeTaskDto) -> RemoteIssue {
        RemoteIssue {
            remote_id: dto.id,
            identifier: dto.identifier,
            title: dto.title,
            description: dto.description,
            status: status_from_vibe(&dto.status),
            priority: priority_from_vibe(&dto.priority),
            parent_remote_id: None,
            modified_at: dto.updated_at,
            deleted: dto.archived,
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
            map.insert("status".into(), serde_json::Value::String(status_to_vibe(status).into()));
        }
        if let Some(priority) = fields.priority {
            map.insert("priority".into(), serde_json::Value::String(priority_to_vibe(priority).into()));
        }
        serde_json::Value::Object(map)
    }
}

#[async_trait]
impl TrackerClient for VibeClient {
    async fn health_check(&self) -> Result<()> {
        self.request(reqwest::Method::GET, "/api/health", None).await?;
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        let body = self.request(reqwest::Method::GET, "/api/projects", None).await?;
        let dtos: Vec<VibeProjectDto> = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(dtos.into_iter().map(Self::project_from_dto).collect())
    }

    async fn get_project(&self, remote_id: &str) -> Result<RemoteProject> {
        let body = self
            .request(reqwest::Method::GET, &format!("/api/projects/{remote_id}"), None)
            .await?;
        let dto: VibeProjectDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(Self::project_from_dto(dto))
    }

    async fn list_issues(&self, project_remote_id: &str, since_cursor: Option<&str>) -> Result<Vec<RemoteIssue>> {
        let path = match since_cursor {
            Some(cursor) => format!("/api/projects/{project_remote_id}/tasks?modifiedSince={cursor}"),
            None => format!("/api/projects/{project_remote_id}/tasks"),
        };
        let body = self.request(reqwest::Method::GET, &path, None).await?;
        let dtos: Vec<VibeTaskDto> = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(dtos.into_iter().map(Self::issue_from_dto).collect())
    }

    async fn get_issue(&self, remote_id: &str) -> Result<RemoteIssue> {
        let body = self
            .request(reqwest::Method::GET, &format!("/api/tasks/{remote_id}"), None)
            .await?;
        let dto: VibeTaskDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(Self::issue_from_dto(dto))
    }

    async fn create_issue(&self, project_remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue> {
        let mut payload = Self::fields_to_json(fields);
        payload["projectId"] = serde_json::Value::String(project_remote_id.to_string());
        let body = self
            .request(reqwest::Method::POST, "/api/tasks", Some(payload))
            .await?;
        let dto: VibeTaskDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(Self::issue_from_dto(dto))
    }

    async fn update_issue(&self, remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue> {
        let payload = Self::fields_to_json(fields);
        let body = self
            .request(reqwest::Method::PATCH, &format!("/api/tasks/{remote_id}"), Some(payload))
            .await?;
        let dto: VibeTaskDto = serde_json::from_value(body).map_err(|e| SyncError::Validation(e.to_string()))?;
        Ok(Self::issue_from_dto(dto))
    }

    async fn delete_issue(&self, remote_id: &str) -> Result<()> {
        self.request(reqwest::Method::DELETE, &format!("/api/tasks/{remote_id}"), None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_huly_issue_tag() {
        assert_eq!(
            extract_huly_tag("Some notes\n\nHuly Issue: PROJ-42"),
            Some("PROJ-42".to_string())
        );
    }

    #[test]
    fn extracts_synced_from_huly_tag() {
        assert_eq!(
            extract_huly_tag("Synced from Huly: ENG-7"),
            Some("ENG-7".to_string())
        );
    }

    #[test]
    fn no_tag_returns_none() {
        assert_eq!(extract_huly_tag("just a plain description"), None);
    }

    #[test]
    fn with_huly_tag_appends_to_empty_description() {
        assert_eq!(with_huly_tag("", "PROJ-1"), "Huly Issue: PROJ-1");
    }

    #[test]
    fn with_huly_tag_appends_to_nonempty_description() {
        assert_eq!(
            with_huly_tag("Fix the bug", "PROJ-1"),
            "Fix the bug\n\nHuly Issue: PROJ-1"
        );
    }

    #[test]
    fn with_huly_tag_replaces_existing_tag() {
        let updated = with_huly_tag("notes\n\nHuly Issue: PROJ-1", "PROJ-2");
        assert_eq!(extract_huly_tag(&updated), Some("PROJ-2".to_string()));
    }
}
