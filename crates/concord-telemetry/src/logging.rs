use tracing_subscriber::{fmt, EnvFilter};

/// Output shape for [`init_logging`] (`general.log_format`, §10.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, colorized when the terminal supports it.
    #[default]
    Human,
    /// One JSON object per line, for a log-shipping agent.
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Human,
        }
    }
}

/// Initialize the global `tracing` subscriber. `RUST_LOG` overrides
/// `default_level` when set. Safe to call more than once — later calls are
/// no-ops (`try_init`).
pub fn init_logging(format: LogFormat, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Human => {
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .try_init()
                .ok();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .try_init()
                .ok();
        }
    }

    tracing::info!(?format, "logging initialised");
}
