//! Tracing setup shared by the node and coordinator binaries.

use std::path::Path;
use tracing::debug;

/// Filter directive for a `-v` count. `RUST_LOG` is not consulted.
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "info,tarpc=warn",
        1 => "debug",
        2 => "trace",
        _ => "trace,tarpc=trace,tokio=debug",
    }
}

/// Initialize tracing for one process role. Call once, before any node starts.
///
/// Module targets appear from `-vv`, thread ids and line numbers from `-vvv`.
pub fn init(verbose: u8, role: &str, config: &Path) {
    let detailed = verbose >= 3;
    tracing_subscriber::fmt()
        .with_env_filter(level_for(verbose))
        .with_target(verbose >= 2)
        .with_thread_ids(detailed)
        .with_line_number(detailed)
        .init();

    debug!(
        "{} starting from {} (filter {:?})",
        role,
        config.display(),
        level_for(verbose)
    );
}
