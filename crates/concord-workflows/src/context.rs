use std::sync::Arc;

use concord_core::error::SyncError;
use concord_core::types::TrackerSource;
use concord_identity::IdentityResolver;
use concord_resilience::CircuitBreakerRegistry;
use concord_sinks::ChangeSink;
use concord_store::MappingStore;
use concord_trackers::TrackerClient;

/// The three tracker clients, addressable by [`TrackerSource`] (§4.1). Kept
/// as a small struct rather than a `HashMap` since the member set is fixed
/// and known at compile time.
#[derive(Clone)]
pub struct Trackers {
    pub huly: Arc<dyn TrackerClient>,
    pub vibe: Arc<dyn TrackerClient>,
    pub beads_by_project: Arc<dyn Fn(&str) -> Option<Arc<dyn TrackerClient>> + Send + Sync>,
}

impl Trackers {
    /// Beads has one client per repository (the CLI/JSONL adapter is bound
    /// to a single `repo_path` at construction), so resolving "the Beads
    /// client" requires the project identifier; `lookup` is expected to be
    /// backed by whatever registry owns the per-project `BeadsClient`s.
    pub fn new(
        huly: Arc<dyn TrackerClient>,
        vibe: Arc<dyn TrackerClient>,
        beads_by_project: impl Fn(&str) -> Option<Arc<dyn TrackerClient>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            huly,
            vibe,
            beads_by_project: Arc::new(beads_by_project),
        }
    }

    pub fn get(&self, source: TrackerSource, project_identifier: &str) -> Result<Arc<dyn TrackerClient>, SyncError> {
        match source {
            TrackerSource::Huly => Ok(self.huly.clone()),
            TrackerSource::Vibe => Ok(self.vibe.clone()),
            TrackerSource::Beads => (self.beads_by_project)(project_identifier)
                .ok_or_else(|| SyncError::Validation(format!("no Beads repo configured for project {project_identifier}"))),
            TrackerSource::Scheduled => Err(SyncError::Fatal("scheduled is not a tracker".into())),
        }
    }
}

/// Everything a sync workflow needs to run an activity: the mapping store,
/// the three tracker clients, the identity resolver, and the sinks to
/// notify on success (§4.6). Cheap to clone — every field is an `Arc` or a
/// zero-sized type.
#[derive(Clone)]
pub struct WorkflowContext {
    pub store: Arc<MappingStore>,
    pub trackers: Trackers,
    pub identity: IdentityResolver,
    pub sinks: Arc<dyn ChangeSink>,
    pub api_delay_ms: u64,
    pub dry_run: bool,
    /// Bounded parallelism for per-issue fan-out within one `ProjectSync`
    /// sweep (`sync.max_workers`, §4.6.2 default 5).
    pub max_workers: usize,
    /// One breaker per project (§4.8): three consecutive `ProjectSync`
    /// failures trip it, and `FullOrchestration` skips open projects until
    /// the cooldown elapses.
    pub project_breakers: Arc<CircuitBreakerRegistry<String>>,
}
