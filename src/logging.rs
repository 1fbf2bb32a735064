//! Diagnostic logging setup.
//!
//! Library code logs through `tracing` macros only; binaries call `init` once at startup.
//! Filter precedence: `DBLAB_LOG`, then `RUST_LOG`, then `debug` with `--verbose`, else `warn`.

use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

fn filter_directive(verbose: bool) -> String {
    env::var("DBLAB_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| env::var("RUST_LOG").ok().filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string())
}

/// Install the stderr fmt subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_new(filter_directive(verbose))
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(crate::color_enabled_stderr());
        if tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .is_err()
        {
            eprintln!("dblab: logging init skipped (global subscriber already set)");
        }
    });
}
