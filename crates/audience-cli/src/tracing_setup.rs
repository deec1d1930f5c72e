//! Logging setup for the command line
//!
//! Logs go to stderr so stdout carries only command output.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,audience_core=info,audience_cli=info";
const VERBOSE_FILTER: &str = "info,audience_core=debug,audience_cli=debug";

/// Installs the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(json: bool, verbose: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if json { builder.json().try_init() } else { builder.try_init() };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
