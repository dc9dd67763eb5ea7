//! Debug logging utilities.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

/// Global debug flag.
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Environment variable for debug mode.
pub const NSLAUNCH_DEBUG_ENV: &str = "NSLAUNCH_DEBUG";

/// Initialize logging from the NSLAUNCH_DEBUG environment variable or an explicit flag.
///
/// Diagnostics go to stderr so that the child's prompt and the peers' output on
/// stdout stay readable.
pub fn init_debug_logging(force_debug: bool) {
    let debug_enabled = force_debug || std::env::var_os(NSLAUNCH_DEBUG_ENV).is_some();
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let filter = if debug_enabled {
        EnvFilter::new("ns_launcher=debug,warn")
    } else {
        EnvFilter::new("ns_launcher=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(debug_enabled)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

/// Check if debug mode is enabled.
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::SeqCst)
}

/// Log a debug message (only if debug is enabled).
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if $crate::utils::debug::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}
