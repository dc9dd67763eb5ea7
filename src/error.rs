//! Error types for the namespace launcher.

use thiserror::Error;

/// Main error type for the launcher.
#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid hostname '{hostname}': {reason}")]
    InvalidHostname { hostname: String, reason: String },

    #[error("Invalid channel bounds: {0}")]
    InvalidChannelBounds(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Errors raised by the named message-queue channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("failed to create message queue {name}: {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("failed to open message queue {name}: {reason}")]
    OpenFailed { name: String, reason: String },

    #[error("failed to send on message queue {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("timed out waiting for a message on {name}")]
    Timeout { name: String },

    #[error("failed to receive from message queue {name}: {reason}")]
    ReceiveFailed { name: String, reason: String },

    #[error("failed to close message queue {name}: {reason}")]
    CloseFailed { name: String, reason: String },

    #[error("failed to remove message queue {name}: {reason}")]
    UnlinkFailed { name: String, reason: String },

    #[error("invalid message queue name '{0}': must start with '/' and contain no other '/'")]
    InvalidName(String),
}

/// Errors raised while creating the isolated child.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("clone failed: {0}")]
    SpawnFailed(String),

    #[error("waiting for child {pid} failed: {reason}")]
    WaitFailed { pid: i32, reason: String },
}

/// Fatal errors inside the child bootstrap sequence.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("jail setup failed during {step}: {source}")]
    Jail {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("could not execute '{command}': {source}")]
    Exec {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, LauncherError>;
