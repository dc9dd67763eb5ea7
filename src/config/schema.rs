//! Launch configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::capability::{IsolationCapabilitySet, IsolationDomain};
use crate::error::ConfigError;

/// Well-known message queue name shared by the launcher and the relay peers.
pub const DEFAULT_CHANNEL_NAME: &str = "/ipc_namespace";

/// Bounds used by the launcher handshake (room for an 80 character message).
pub const HANDSHAKE_BOUNDS: ChannelBounds = ChannelBounds {
    max_messages: 10,
    max_message_size: 81,
};

/// Bounds used by the standalone relay peers (room for a 60 character message).
pub const RELAY_BOUNDS: ChannelBounds = ChannelBounds {
    max_messages: 10,
    max_message_size: 61,
};

/// How long the parent waits for the child's handshake message.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest handshake wait accepted (one day).
pub const MAX_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest hostname the kernel accepts (HOST_NAME_MAX).
pub const MAX_HOSTNAME_LEN: usize = 64;

/// Capacity limits of a message queue instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBounds {
    /// Maximum number of queued messages.
    pub max_messages: usize,
    /// Maximum size of a single message in bytes.
    pub max_message_size: usize,
}

impl ChannelBounds {
    /// Create validated bounds.
    pub fn new(max_messages: usize, max_message_size: usize) -> Result<Self, ConfigError> {
        let bounds = Self {
            max_messages,
            max_message_size,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Both limits must be at least one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_messages == 0 {
            return Err(ConfigError::InvalidChannelBounds(
                "queue depth must be at least 1".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidChannelBounds(
                "message size must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }

    /// Longest text line that fits, leaving one byte for a terminator.
    pub fn max_text_len(&self) -> usize {
        self.max_message_size.saturating_sub(1)
    }
}

/// Which queue the handshake uses and how large it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Queue name, including the leading '/'.
    pub name: String,
    pub bounds: ChannelBounds,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHANNEL_NAME.to_string(),
            bounds: HANDSHAKE_BOUNDS,
        }
    }
}

/// Immutable description of one launch.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Stage-by-stage tracing; the entry point initializes logging from it.
    pub verbose: bool,

    /// Isolation domains the child is enrolled in.
    pub capabilities: IsolationCapabilitySet,

    /// Whether the child sends a handshake message back to the parent.
    pub ipc_requested: bool,

    /// Whether the IPC view itself is isolated.
    pub ipc_namespace_isolated: bool,

    /// Directory to chroot into.
    pub jail_path: Option<PathBuf>,

    /// Hostname for the private hostname view.
    pub hostname: Option<String>,

    /// Command and arguments to exec; `None` exits right after setup.
    pub command: Option<Vec<String>>,

    /// Handshake channel.
    pub channel: ChannelSettings,

    /// Deadline for the handshake receive, measured from spawn time.
    pub handshake_timeout: Duration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            verbose: false,
            capabilities: IsolationCapabilitySet::new(),
            ipc_requested: false,
            ipc_namespace_isolated: false,
            jail_path: None,
            hostname: None,
            command: None,
            channel: ChannelSettings::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl Configuration {
    /// Whether a chroot jail was requested.
    pub fn jail_requested(&self) -> bool {
        self.jail_path.is_some()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let wants_uts = self.capabilities.contains(IsolationDomain::HostnameView);
        match (&self.hostname, wants_uts) {
            (Some(hostname), true) => validate_hostname(hostname)?,
            (None, true) => {
                return Err(ConfigError::ValidationError(
                    "a hostname is required for a private hostname view".to_string(),
                ))
            }
            (Some(hostname), false) => {
                return Err(ConfigError::InvalidHostname {
                    hostname: hostname.clone(),
                    reason: "hostname given without a private hostname view".to_string(),
                })
            }
            (None, false) => {}
        }

        if self.ipc_namespace_isolated != self.capabilities.contains(IsolationDomain::IpcView) {
            return Err(ConfigError::ValidationError(
                "IPC namespace isolation flag disagrees with the capability set".to_string(),
            ));
        }
        if self.ipc_namespace_isolated && !self.ipc_requested {
            return Err(ConfigError::ValidationError(
                "IPC namespace isolation is only offered together with the handshake".to_string(),
            ));
        }

        if let Some(ref path) = self.jail_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(
                    "jail directory cannot be empty".to_string(),
                ));
            }
        }

        if let Some(ref command) = self.command {
            if command.is_empty() {
                return Err(ConfigError::ValidationError(
                    "command must name a program".to_string(),
                ));
            }
        }

        if !self.channel.name.starts_with('/') || self.channel.name[1..].contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "invalid message queue name '{}'",
                self.channel.name
            )));
        }
        self.channel.bounds.validate()?;

        if self.handshake_timeout > MAX_HANDSHAKE_TIMEOUT {
            return Err(ConfigError::ValidationError(format!(
                "handshake timeout cannot exceed {} seconds",
                MAX_HANDSHAKE_TIMEOUT.as_secs()
            )));
        }

        Ok(())
    }
}

/// Validate a hostname for sethostname(2).
fn validate_hostname(hostname: &str) -> Result<(), ConfigError> {
    if hostname.is_empty() {
        return Err(ConfigError::InvalidHostname {
            hostname: hostname.to_string(),
            reason: "hostname cannot be empty".to_string(),
        });
    }

    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(ConfigError::InvalidHostname {
            hostname: hostname.to_string(),
            reason: format!("hostname is longer than {} bytes", MAX_HOSTNAME_LEN),
        });
    }

    if hostname.contains('\0') {
        return Err(ConfigError::InvalidHostname {
            hostname: hostname.to_string(),
            reason: "hostname cannot contain NUL".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uts_config(hostname: Option<&str>) -> Configuration {
        Configuration {
            capabilities: IsolationCapabilitySet::new().with(IsolationDomain::HostnameView),
            hostname: hostname.map(str::to_string),
            ..Configuration::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Configuration::default();
        assert!(config.validate().is_ok());
        assert!(!config.jail_requested());
        assert_eq!(config.channel.name, "/ipc_namespace");
        assert_eq!(config.channel.bounds, HANDSHAKE_BOUNDS);
        assert_eq!(config.handshake_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_handshake_timeout_is_capped() {
        let at_cap = Configuration {
            handshake_timeout: MAX_HANDSHAKE_TIMEOUT,
            ..Configuration::default()
        };
        assert!(at_cap.validate().is_ok());

        let too_long = Configuration {
            handshake_timeout: Duration::from_secs(u64::MAX),
            ..Configuration::default()
        };
        assert!(matches!(
            too_long.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_hostname_requires_uts() {
        assert!(uts_config(Some("box")).validate().is_ok());
        assert!(uts_config(None).validate().is_err());

        let config = Configuration {
            hostname: Some("box".to_string()),
            ..Configuration::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHostname { .. })
        ));
    }

    #[test]
    fn test_hostname_validation() {
        assert!(validate_hostname("container-1").is_ok());
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname(&"a".repeat(MAX_HOSTNAME_LEN)).is_ok());
        assert!(validate_hostname(&"a".repeat(MAX_HOSTNAME_LEN + 1)).is_err());
        assert!(validate_hostname("bad\0name").is_err());
    }

    #[test]
    fn test_ipc_isolation_consistency() {
        let isolated = Configuration {
            capabilities: IsolationCapabilitySet::new().with(IsolationDomain::IpcView),
            ipc_requested: true,
            ipc_namespace_isolated: true,
            ..Configuration::default()
        };
        assert!(isolated.validate().is_ok());

        let missing_domain = Configuration {
            ipc_requested: true,
            ipc_namespace_isolated: true,
            ..Configuration::default()
        };
        assert!(missing_domain.validate().is_err());

        let without_handshake = Configuration {
            ipc_requested: false,
            ..isolated
        };
        assert!(without_handshake.validate().is_err());
    }

    #[test]
    fn test_empty_command_rejected() {
        let config = Configuration {
            command: Some(Vec::new()),
            ..Configuration::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_channel_bounds() {
        assert!(ChannelBounds::new(10, 81).is_ok());
        assert!(ChannelBounds::new(0, 81).is_err());
        assert!(ChannelBounds::new(10, 0).is_err());
        assert_eq!(HANDSHAKE_BOUNDS.max_text_len(), 80);
        assert_eq!(RELAY_BOUNDS.max_text_len(), 60);
    }

    #[test]
    fn test_channel_name_validation() {
        let mut config = Configuration::default();
        config.channel.name = "ipc_namespace".to_string();
        assert!(config.validate().is_err());

        config.channel.name = "/a/b".to_string();
        assert!(config.validate().is_err());

        config.channel.name = "/launcher-test".to_string();
        assert!(config.validate().is_ok());
    }
}
