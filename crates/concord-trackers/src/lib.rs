//! Tracker clients (C1) — a uniform typed capability set
//! ([`client::TrackerClient`]) implemented once per system: Huly and Vibe as
//! HTTP JSON clients, Beads as a CLI+JSONL adapter. Each implementation
//! converts its own transport errors into `concord_core::error::SyncError`
//! at this boundary, following the teacher's `GitHubError`/`LinearError`
//! wrapping pattern.

pub mod beads;
pub mod client;
pub mod huly;
pub mod vibe;

pub use beads::BeadsClient;
pub use client::{IssueFields, RemoteIssue, RemoteProject, TrackerClient};
pub use huly::HulyClient;
pub use vibe::VibeClient;
