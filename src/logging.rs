// Logging init: `tracing` to stderr, filtered by `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `verbose` only changes the default
/// filter; an explicit `RUST_LOG` always wins.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        "info,classroom_dl=debug"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
