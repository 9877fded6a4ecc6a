//! The webhook HTTP receiver (§6) — the only externally-facing surface this
//! workspace carries over from the teacher's `at-bridge`. The management UI,
//! SSE fan-out to browser clients, and every other route family in
//! `at-bridge::http_api` are out of scope (§10.1) and are not reproduced
//! here; this crate is deliberately a small fraction of its size.

pub mod router;
pub mod state;
pub mod webhook;

pub use router::router;
pub use state::BridgeState;
pub use webhook::{receive_webhook, WebhookResponse};
