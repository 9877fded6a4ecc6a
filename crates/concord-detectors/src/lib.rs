//! Change detectors (C4) — four independent sources that normalize their
//! native event shapes into a common [`concord_core::types::ChangeEvent`]
//! and hand it to the workflow runtime via a bounded channel, following the
//! "small state machine per detector, single dispatcher drains the channel"
//! pattern (§9 "mixed callback/promise/event-loop code in the source").

pub mod beads_watcher;
pub mod scheduled;
pub mod vibe_stream;
pub mod webhook;

pub use beads_watcher::BeadsWatcher;
pub use scheduled::ScheduledTicker;
pub use vibe_stream::VibeEventStream;
pub use webhook::{decode_webhook_payload, HulyWebhookChange, HulyWebhookPayload, WebhookDecodeError};
