//! CLI parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::capability::{IsolationCapabilitySet, IsolationDomain};
use crate::config::{ChannelSettings, Configuration, DEFAULT_CHANNEL_NAME, MAX_HANDSHAKE_TIMEOUT};
use crate::error::ConfigError;

/// Handshake mode selected with `-i`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcMode {
    /// Send a handshake message over the host's IPC namespace.
    No,
    /// Send a handshake message and isolate the IPC namespace as well.
    Yes,
}

/// Launch a command inside fresh Linux namespaces
#[derive(Parser, Debug)]
#[command(name = "nslaunch")]
#[command(about = "Run a command with private pid/mount/uts/net/ipc views, an optional chroot jail and a parent handshake")]
#[command(version)]
pub struct Cli {
    /// Print every setup stage
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Private process-id numbering
    #[arg(short = 'p', long = "pid")]
    pub pid: bool,

    /// Private mount table
    #[arg(short = 'm', long = "mount")]
    pub mount: bool,

    /// Private hostname, set to HOSTNAME
    #[arg(short = 'u', long = "uts", value_name = "HOSTNAME")]
    pub hostname: Option<String>,

    /// Private network stack
    #[arg(short = 'n', long = "net")]
    pub net: bool,

    /// Send a message from the child to the parent; `yes` also isolates IPC
    #[arg(short = 'i', long = "ipc", value_enum, value_name = "no|yes")]
    pub ipc: Option<IpcMode>,

    /// Chroot the child into DIR
    #[arg(short = 'c', long = "chroot", value_name = "DIR")]
    pub chroot: Option<PathBuf>,

    /// Message queue used for the handshake
    #[arg(long = "queue", value_name = "NAME", default_value = DEFAULT_CHANNEL_NAME)]
    pub queue: String,

    /// Seconds the parent waits for the handshake message
    #[arg(
        long = "timeout",
        value_name = "SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(..=MAX_HANDSHAKE_TIMEOUT.as_secs())
    )]
    pub timeout: u64,

    /// Command and arguments to run in the child
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Isolation domains selected by the flags.
    pub fn capabilities(&self) -> IsolationCapabilitySet {
        let mut capabilities = IsolationCapabilitySet::new();
        if self.pid {
            capabilities.add(IsolationDomain::ProcessIdView);
        }
        if self.mount {
            capabilities.add(IsolationDomain::MountView);
        }
        if self.hostname.is_some() {
            capabilities.add(IsolationDomain::HostnameView);
        }
        if self.net {
            capabilities.add(IsolationDomain::NetworkView);
        }
        if self.ipc == Some(IpcMode::Yes) {
            capabilities.add(IsolationDomain::IpcView);
        }
        capabilities
    }

    /// Build and validate the launch configuration.
    pub fn to_configuration(&self) -> Result<Configuration, ConfigError> {
        let config = Configuration {
            verbose: self.verbose,
            capabilities: self.capabilities(),
            ipc_requested: self.ipc.is_some(),
            ipc_namespace_isolated: self.ipc == Some(IpcMode::Yes),
            jail_path: self.chroot.clone(),
            hostname: self.hostname.clone(),
            command: if self.command.is_empty() {
                None
            } else {
                Some(self.command.clone())
            },
            channel: ChannelSettings {
                name: self.queue.clone(),
                ..ChannelSettings::default()
            },
            handshake_timeout: Duration::from_secs(self.timeout),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Options shared by the relay peers.
#[derive(Parser, Debug)]
#[command(version)]
pub struct PeerCli {
    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Message queue name
    #[arg(short = 'q', long = "queue", value_name = "NAME", default_value = DEFAULT_CHANNEL_NAME)]
    pub queue: String,
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nslaunch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_no_flags() {
        let cli = parse(&[]);
        assert!(cli.capabilities().is_empty());

        let config = cli.to_configuration().unwrap();
        assert!(!config.verbose);
        assert!(!config.ipc_requested);
        assert!(config.command.is_none());
        assert!(config.jail_path.is_none());
        assert_eq!(config.channel.name, "/ipc_namespace");
        assert_eq!(config.handshake_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_flags_map_onto_capabilities() {
        let cli = parse(&["-p", "-m", "-u", "jail-host", "-n"]);
        let expected = IsolationCapabilitySet::new()
            .with(IsolationDomain::ProcessIdView)
            .with(IsolationDomain::MountView)
            .with(IsolationDomain::HostnameView)
            .with(IsolationDomain::NetworkView);
        assert_eq!(cli.capabilities(), expected);

        let config = cli.to_configuration().unwrap();
        assert_eq!(config.hostname.as_deref(), Some("jail-host"));
        assert!(config.capabilities.requires_proc_remount());
    }

    #[test]
    fn test_ipc_modes() {
        let no = parse(&["-i", "no"]).to_configuration().unwrap();
        assert!(no.ipc_requested);
        assert!(!no.ipc_namespace_isolated);
        assert!(!no.capabilities.contains(IsolationDomain::IpcView));

        let yes = parse(&["-i", "yes"]).to_configuration().unwrap();
        assert!(yes.ipc_requested);
        assert!(yes.ipc_namespace_isolated);
        assert!(yes.capabilities.contains(IsolationDomain::IpcView));
    }

    #[test]
    fn test_invalid_ipc_value_is_usage_error() {
        let err = Cli::try_parse_from(["nslaunch", "-i", "maybe"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_command_tail_keeps_its_flags() {
        let cli = parse(&["-p", "-c", "/srv/jail", "ls", "-l", "-v"]);
        assert!(cli.pid);
        assert!(!cli.verbose);
        assert_eq!(cli.chroot, Some(PathBuf::from("/srv/jail")));
        assert_eq!(cli.command, vec!["ls", "-l", "-v"]);

        let config = cli.to_configuration().unwrap();
        assert!(!config.verbose);
        assert_eq!(
            config.command,
            Some(vec!["ls".to_string(), "-l".to_string(), "-v".to_string()])
        );
    }

    #[test]
    fn test_verbose_flag_reaches_configuration() {
        let config = parse(&["-v", "-p"]).to_configuration().unwrap();
        assert!(config.verbose);
    }

    #[test]
    fn test_bad_hostname_rejected() {
        let long = "h".repeat(65);
        let cli = parse(&["-u", &long]);
        assert!(matches!(
            cli.to_configuration(),
            Err(ConfigError::InvalidHostname { .. })
        ));
    }

    #[test]
    fn test_queue_and_timeout_overrides() {
        let config = parse(&["--queue", "/demo", "--timeout", "5", "-i", "no"])
            .to_configuration()
            .unwrap();
        assert_eq!(config.channel.name, "/demo");
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_oversized_timeout_is_usage_error() {
        let err = Cli::try_parse_from(["nslaunch", "--timeout", "18446744073709551615", "true"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);

        let at_cap = parse(&["--timeout", "86400"]).to_configuration().unwrap();
        assert_eq!(at_cap.handshake_timeout, MAX_HANDSHAKE_TIMEOUT);
    }

    #[test]
    fn test_peer_cli_defaults() {
        let cli = PeerCli::try_parse_from(["mq-receiver"]).unwrap();
        assert!(!cli.verbose);
        assert_eq!(cli.queue, DEFAULT_CHANNEL_NAME);
    }
}
