//! Namespace launcher - run a command inside fresh Linux namespaces.
//!
//! The launcher clones a child into the requested isolation domains, optionally
//! jails it with chroot, remounts `/proc`, sets its hostname and execs a command.
//! A POSIX message queue carries an optional one-shot handshake from the child
//! back to the parent. The same queue primitive backs the standalone relay peers.

pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod sandbox;
pub mod utils;

#[cfg(target_os = "linux")]
pub mod channel;
#[cfg(target_os = "linux")]
pub mod coordinator;
#[cfg(target_os = "linux")]
pub mod peer;

pub use capability::{IsolationCapabilitySet, IsolationDomain};
pub use config::{ChannelBounds, Configuration};
pub use error::{ChannelError, ConfigError, LauncherError, Result};

#[cfg(target_os = "linux")]
pub use channel::{IpcChannel, IpcMessage};
#[cfg(target_os = "linux")]
pub use coordinator::{HandshakeOutcome, ParentCoordinator, RunReport};

/// Re-export commonly used items.
pub mod prelude {
    pub use crate::capability::{IsolationCapabilitySet, IsolationDomain};
    pub use crate::config::Configuration;
    pub use crate::error::{LauncherError, Result};

    #[cfg(target_os = "linux")]
    pub use crate::coordinator::{ParentCoordinator, RunReport};
}
