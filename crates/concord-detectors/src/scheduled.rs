use std::time::Duration;

use concord_core::types::{ChangeEvent, ChangeKind, TrackerSource};
use tracing::debug;

/// The periodic orchestrator detector (§4.4): every `interval`, emits one
/// *ProjectSync*-shaped [`ChangeEvent`] per candidate project. The set of
/// candidate projects itself is the mapping store's `GetProjectsToSync`
/// gating predicate, evaluated by the caller — this ticker only owns the
/// timing.
pub struct ScheduledTicker {
    interval: tokio::time::Interval,
}

impl ScheduledTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait for the next tick and produce a `ChangeEvent` for `project`.
    pub async fn next_event(&mut self, project_identifier: &str) -> ChangeEvent {
        self.interval.tick().await;
        debug!(project_identifier, "scheduled tick");
        ChangeEvent::new(
            TrackerSource::Scheduled,
            project_identifier,
            ChangeKind::Unknown,
            serde_json::json!({ "project_identifier": project_identifier }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn emits_event_on_tick() {
        let mut ticker = ScheduledTicker::new(Duration::from_millis(10));
        let event = ticker.next_event("PROJ").await;
        assert_eq!(event.source, TrackerSource::Scheduled);
        assert_eq!(event.entity_ref, "PROJ");
    }
}
