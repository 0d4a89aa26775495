//! Global CLI options and logging setup.

use clap::Args;
use quota_kernel::LogLevel;
use tracing_subscriber::EnvFilter;

/// Global options for CLI commands.
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// JSON output envelope
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Suppress configuration notices
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log filter, e.g. `debug` (env: QUOTA_LOG; falls back to RUST_LOG, then the config)
    #[arg(long, global = true, env = "QUOTA_LOG")]
    pub log_level: Option<String>,
}

impl GlobalOpts {
    pub fn wants_json(&self) -> bool {
        self.json || self.pretty
    }
}

/// Install the stderr log subscriber. `configured` is the config file's level, used only
/// when neither `--log-level` nor `RUST_LOG` is set.
pub fn setup_logging(opts: &GlobalOpts, configured: LogLevel) {
    let filter = match &opts.log_level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.as_filter())),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .try_init();
}
