//=====================================================
// File: logging.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tracing setup for the Bigton tools
// Objective: Route runtime diagnostics to stderr with an env-controlled
//            filter so program output on stdout stays clean
//=====================================================

use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Environment variable holding filter directives, e.g. `bigton_runtime=debug`.
pub const LOG_ENV: &str = "BIGTON_LOG";

static INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber once. `verbose` lowers the default level
/// from warnings to debug output.
pub fn init(tool: &str, verbose: bool) {
    INIT.get_or_init(|| {
        let default = if verbose { Level::DEBUG } else { Level::WARN };
        let filter = EnvFilter::builder()
            .with_default_directive(default.into())
            .with_env_var(LOG_ENV)
            .from_env_lossy();
        SubscriberBuilder::default()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .init();
    });
    tracing::debug!(tool, "tracing initialised");
}
