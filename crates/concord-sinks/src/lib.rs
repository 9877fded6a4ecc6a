//! External change sinks (C9) — fire-and-forget notifiers invoked after a
//! successful sync. Every sink must swallow its own errors; nothing here
//! is allowed to affect a workflow's outcome.

pub mod graph;
pub mod letta;
pub mod sink;

pub use graph::GraphStoreSink;
pub use letta::LettaSink;
pub use sink::{ChangeSink, CompositeSink, NoopSink};

use std::sync::Arc;

use concord_core::config::SinksConfig;

/// Build the configured sink from `[sinks]` config: a `CompositeSink` over
/// whichever of Letta/graph-store have a `base_url` set, falling back to
/// `NoopSink` when neither is configured.
pub fn sink_from_config(cfg: &SinksConfig) -> Arc<dyn ChangeSink> {
    let mut sinks: Vec<Arc<dyn ChangeSink>> = Vec::new();
    if let Some(base_url) = &cfg.letta_base_url {
        sinks.push(Arc::new(LettaSink::new(base_url.clone(), cfg.letta_token.clone())));
    }
    if let Some(base_url) = &cfg.graph_base_url {
        sinks.push(Arc::new(GraphStoreSink::new(base_url.clone(), cfg.graph_token.clone())));
    }
    match sinks.len() {
        0 => Arc::new(NoopSink),
        1 => sinks.remove(0),
        _ => Arc::new(CompositeSink::new(sinks)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_sinks_yield_noop() {
        let cfg = SinksConfig {
            letta_base_url: None,
            letta_token: None,
            graph_base_url: None,
            graph_token: None,
        };
        let _sink = sink_from_config(&cfg);
    }
}
