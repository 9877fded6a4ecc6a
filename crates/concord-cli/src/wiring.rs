use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use concord_core::config::Config;
use concord_identity::IdentityResolver;
use concord_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, RateLimitConfig, RateLimiter, SubprocessLimiter};
use concord_store::MappingStore;
use concord_trackers::{BeadsClient, HulyClient, TrackerClient, VibeClient};
use concord_workflows::{Trackers, WorkflowContext};

use std::time::Duration;

/// Assemble a [`WorkflowContext`] from a loaded [`Config`] (§6, §10.4): open
/// the mapping store, build the three tracker clients with their own rate
/// limiters, and wire the Beads-per-project lookup off the "folder name is
/// the project identifier" convention (§9) — each `beads.repo_paths` entry
/// is keyed by its last path segment, uppercased, the same heuristic
/// `MappingStore::resolve_project_identifier`'s third rule uses.
pub async fn build_context(config: &Config) -> anyhow::Result<WorkflowContext> {
    let store = Arc::new(MappingStore::new(&config.store.path).await?);

    let huly_limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_second(config.huly.requests_per_second)));
    let huly: Arc<dyn TrackerClient> = Arc::new(HulyClient::new(
        config.huly.base_url.clone().unwrap_or_default(),
        config.huly.token.clone().unwrap_or_default(),
        huly_limiter,
    ));

    let vibe_limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_second(config.vibe.requests_per_second)));
    let vibe: Arc<dyn TrackerClient> = Arc::new(VibeClient::new(
        config.vibe.base_url.clone().unwrap_or_default(),
        config.vibe.token.clone().unwrap_or_default(),
        vibe_limiter,
    ));

    let subprocess_limiter = Arc::new(SubprocessLimiter::new(config.beads.max_concurrent_cli));
    let mut beads_clients: HashMap<String, Arc<dyn TrackerClient>> = HashMap::new();
    for repo_path in &config.beads.repo_paths {
        let identifier = project_identifier_from_repo_path(repo_path);
        let client: Arc<dyn TrackerClient> = Arc::new(BeadsClient::new(
            config.beads.cli_path.clone(),
            PathBuf::from(repo_path),
            subprocess_limiter.clone(),
        ));
        beads_clients.insert(identifier, client);
    }
    let beads_by_project = move |project_identifier: &str| beads_clients.get(project_identifier).cloned();

    let breaker_config = CircuitBreakerConfig {
        failure_threshold: config.circuit_breaker.failure_threshold,
        cooldown: Duration::from_millis(config.circuit_breaker.cooldown_ms),
        ..CircuitBreakerConfig::default()
    };

    Ok(WorkflowContext {
        store,
        trackers: Trackers::new(huly, vibe, beads_by_project),
        identity: IdentityResolver::new(),
        sinks: concord_sinks::sink_from_config(&config.sinks),
        api_delay_ms: config.sync.api_delay_ms,
        dry_run: config.sync.dry_run,
        max_workers: config.sync.max_workers as usize,
        project_breakers: Arc::new(CircuitBreakerRegistry::new(breaker_config)),
    })
}

pub(crate) fn project_identifier_from_repo_path(repo_path: &str) -> String {
    repo_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(repo_path)
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_identifier_from_repo_path_uses_last_segment_uppercased() {
        assert_eq!(project_identifier_from_repo_path("/home/user/repos/my-project"), "MY-PROJECT");
        assert_eq!(project_identifier_from_repo_path("/repos/proj/"), "PROJ");
    }
}
