//! Logging setup for the command-line interface.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a stderr subscriber filtered by `$RUST_LOG`.
///
/// Without `$RUST_LOG`, fusebridge crates log at `info`, or `debug` when
/// `verbose` is set, and everything else at `warn`.
pub fn set_up_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Target prefixes cover every fusebridge_* crate.
        format!("fusebridge={},warn", default_level).into()
    });

    let fmt_layer = fmt::layer()
        .with_target(verbose)
        .with_thread_names(verbose)
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
