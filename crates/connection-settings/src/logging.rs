//! Log setup for command line tools.

use tracing::Level;

/// Trace when verbose, info otherwise.
pub const fn log_level(verbose: bool) -> Level {
    if verbose { Level::TRACE } else { Level::INFO }
}

/// Installs a global fmt subscriber at [`log_level`]. Returns false if a global subscriber
/// was already set, in which case nothing changes.
pub fn init_logging(verbose: bool) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(log_level(verbose))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
