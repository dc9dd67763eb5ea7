//! Utility modules.

pub mod debug;
pub mod platform;

pub use debug::{init_debug_logging, is_debug_enabled, NSLAUNCH_DEBUG_ENV};
pub use platform::{get_wsl_version, namespaces_supported};
