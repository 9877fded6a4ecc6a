use async_trait::async_trait;
use chrono::{DateTime, Utc};
use concord_core::error::{Result, SyncError};
use concord_core::mapping::{priority_from_beads, priority_to_beads, status_from_beads, status_to_beads};
use concord_resilience::SubprocessLimiter;
use concord_runtime::{retry_with_backoff, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

use crate::client::{IssueFields, RemoteIssue, RemoteProject, TrackerClient};

/// One line of a repository's `issues.jsonl` (§6: "fields consumed").
#[derive(Debug, Clone, Deserialize)]
pub struct BeadsJsonlRow {
    pub id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl BeadsJsonlRow {
    pub fn is_tombstone(&self) -> bool {
        self.status == "tombstone"
    }
}

/// Reads `issues.jsonl` directly rather than going through the CLI for bulk
/// listing — the CLI is reserved for mutations (§4.1, §9 "subprocess +
/// filesystem coupling for Beads").
pub fn read_issues_jsonl(repo_path: &Path) -> Result<Vec<BeadsJsonlRow>> {
    let file_path = repo_path.join("issues.jsonl");
    let contents = std::fs::read_to_string(&file_path)
        .map_err(|e| SyncError::Transient(format!("reading {}: {e}", file_path.display())))?;

    let mut rows = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: BeadsJsonlRow = serde_json::from_str(line)
            .map_err(|e| SyncError::Validation(format!("{}:{}: {e}", file_path.display(), line_no + 1)))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Non-tombstoned rows only — the `ListIssues` contract filters out
/// `status==tombstone` (§4.1).
pub fn read_live_issues_jsonl(repo_path: &Path) -> Result<Vec<BeadsJsonlRow>> {
    Ok(read_issues_jsonl(repo_path)?
        .into_iter()
        .filter(|r| !r.is_tombstone())
        .collect())
}

fn row_to_remote_issue(row: BeadsJsonlRow) -> RemoteIssue {
    let deleted = row.is_tombstone();
    RemoteIssue {
        remote_id: row.id.clone(),
        identifier: row.id,
        title: row.title,
        description: row.description,
        status: status_from_beads(&row.status, &row.labels),
        priority: priority_from_beads(&row.priority),
        parent_remote_id: row.parent_id,
        modified_at: row.updated_at,
        deleted,
    }
}

/// Subprocess + JSONL adapter for the per-repository Beads CLI (`bd`).
/// Mutating subcommands (`create`/`update`/`close`/`label`/`dep add`) pass
/// `--no-auto-flush` so the daemon exports consistently (§4.1); reads —
/// `--version`, `dep tree`, and bulk listing — go through `run_cli`/the
/// JSONL file without it, so a plain health check or tree lookup never
/// inherits a mutation-only flag.
#[derive(Debug, Clone)]
pub struct BeadsClient {
    cli_path: String,
    repo_path: PathBuf,
    limiter: Arc<SubprocessLimiter>,
}

impl BeadsClient {
    pub fn new(cli_path: impl Into<String>, repo_path: impl Into<PathBuf>, limiter: Arc<SubprocessLimiter>) -> Self {
        Self {
            cli_path: cli_path.into(),
            repo_path: repo_path.into(),
            limiter,
        }
    }

    /// Invokes `bd` as a single at-least-once activity (§4.5), retried under
    /// [`RetryPolicy::default`] — a timed-out or failed-to-spawn invocation
    /// is transient; the subprocess concurrency permit is re-acquired on
    /// each attempt so a retry never holds two slots at once. Callers pass
    /// `--no-auto-flush` themselves for mutating subcommands (§4.1); this
    /// method does not add it, so reads stay plain `bd` invocations.
    async fn run_cli(&self, args: &[&str]) -> Result<String> {
        retry_with_backoff(RetryPolicy::default(), || async {
            let _permit = self.limiter.acquire().await;

            let output = tokio::time::timeout(
                std::time::Duration::from_secs(30),
                Command::new(&self.cli_path)
                    .args(args)
                    .current_dir(&self.repo_path)
                    .output(),
            )
            .await
            .map_err(|_| SyncError::Transient(format!("bd {args:?} timed out after 30s")))?
            .map_err(|e| SyncError::Transient(format!("spawning bd: {e}")))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                return Err(SyncError::Transient(format!("bd {args:?} failed: {stderr}")));
            }
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
        .await
    }

    /// `dep add child parent --type=parent-child` — the only way Beads
    /// records parent/child linkage (§4.7).
    pub async fn link_parent(&self, child_id: &str, parent_id: &str) -> Result<()> {
        self.run_cli(&["dep", "add", child_id, parent_id, "--type=parent-child", "--no-auto-flush"])
            .await?;
        Ok(())
    }

    /// `dep tree id --json` — used to discover existing parent/child edges.
    pub async fn dep_tree(&self, id: &str) -> Result<serde_json::Value> {
        let out = self.run_cli(&["dep", "tree", id, "--json"]).await?;
        serde_json::from_str(&out).map_err(|e| SyncError::Validation(format!("malformed dep tree output: {e}")))
    }
}

#[async_trait]
impl TrackerClient for BeadsClient {
    async fn health_check(&self) -> Result<()> {
        self.run_cli(&["--version"]).await?;
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        // Beads has no project concept of its own: one repository is one
        // project, identified by its configured path (§9 "folder name =
        // project identifier").
        let name = self
            .repo_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.repo_path.to_string_lossy().into_owned());
        Ok(vec![RemoteProject {
            remote_id: self.repo_path.to_string_lossy().into_owned(),
            identifier: name.clone(),
            name,
            description: None,
        }])
    }

    async fn get_project(&self, remote_id: &str) -> Result<RemoteProject> {
        self.list_projects()
            .await?
            .into_iter()
            .find(|p| p.remote_id == remote_id)
            .ok_or_else(|| SyncError::NotFound(remote_id.to_string()))
    }

    async fn list_issues(&self, _project_remote_id: &str, _since_cursor: Option<&str>) -> Result<Vec<RemoteIssue>> {
        Ok(read_live_issues_jsonl(&self.repo_path)?
            .into_iter()
            .map(row_to_remote_issue)
            .collect())
    }

    async fn get_issue(&self, remote_id: &str) -> Result<RemoteIssue> {
        read_issues_jsonl(&self.repo_path)?
            .into_iter()
            .find(|r| r.id == remote_id)
            .map(row_to_remote_issue)
            .ok_or_else(|| SyncError::NotFound(remote_id.to_string()))
    }

    async fn create_issue(&self, _project_remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue> {
        let title = fields.title.clone().ok_or_else(|| SyncError::Validation("title required".into()))?;
        let (status, _) = status_to_beads(fields.status.unwrap_or_default());
        let priority = priority_to_beads(fields.priority.unwrap_or_default());

        self.run_cli(&[
            "create",
            "--title",
            &title,
            "--status",
            status,
            "--priority",
            priority,
            "--no-auto-flush",
        ])
        .await?;

        // `bd create` does not echo the new id on all versions; re-read the
        // freshly-appended JSONL row by title, matching the create-is-
        // idempotent contract used elsewhere in this client (§4.1).
        read_live_issues_jsonl(&self.repo_path)?
            .into_iter()
            .rev()
            .find(|r| r.title == title)
            .map(row_to_remote_issue)
            .ok_or_else(|| SyncError::Transient("created issue not found after bd create".into()))
    }

    async fn update_issue(&self, remote_id: &str, fields: &IssueFields) -> Result<RemoteIssue> {
        if let Some(status) = fields.status {
            let (status_str, label) = status_to_beads(status);
            self.run_cli(&["update", remote_id, "--status", status_str, "--no-auto-flush"]).await?;
            if let Some(label) = label {
                self.run_cli(&["label", remote_id, "add", label, "--no-auto-flush"]).await?;
            }
        }
        if let Some(priority) = fields.priority {
            self.run_cli(&["update", remote_id, "--priority", priority_to_beads(priority), "--no-auto-flush"])
                .await?;
        }
        if let Some(title) = &fields.title {
            self.run_cli(&["update", remote_id, "--title", title, "--no-auto-flush"]).await?;
        }
        if let Some(description) = &fields.description {
            self.run_cli(&["update", remote_id, "--description", description, "--no-auto-flush"]).await?;
        }
        if let Some(parent) = &fields.parent_remote_id {
            self.link_parent(remote_id, parent).await?;
        }
        self.get_issue(remote_id).await
    }

    async fn delete_issue(&self, remote_id: &str) -> Result<()> {
        self.run_cli(&["close", remote_id, "--no-auto-flush"]).await?;
        Ok(())
    }
}
