//! Parent-side orchestration of one launch.

use std::time::{Duration, SystemTime};

use crate::channel::{IpcChannel, IpcMessage, OwnedChannel};
use crate::config::Configuration;
use crate::debug_log;
use crate::error::{ChannelError, LauncherError};
use crate::sandbox::check_dependencies;
use crate::sandbox::linux::{ChildBootstrapper, ChildExit, LinuxSystem, ProcessLauncher, SystemOps};

/// What became of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// No handshake was configured.
    NotRequested,
    /// The child's message.
    Received(IpcMessage),
    /// Nothing arrived before the deadline.
    TimedOut,
    /// The receive itself failed.
    Failed(ChannelError),
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub child_pid: i32,
    pub handshake: HandshakeOutcome,
    pub exit: ChildExit,
}

impl RunReport {
    /// Text announcing the child's message, if one arrived.
    pub fn handshake_banner(&self) -> Option<String> {
        match self.handshake {
            HandshakeOutcome::Received(ref message) => Some(format!(
                "\n    Parent: the following message was received from the child\n     >> {}\n",
                message
            )),
            _ => None,
        }
    }
}

/// Absolute deadline `timeout` after `start`, saturating far in the future when
/// the sum is not representable.
pub fn handshake_deadline(start: SystemTime, timeout: Duration) -> SystemTime {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(crate::config::MAX_HANDSHAKE_TIMEOUT))
        .unwrap_or(start)
}

/// Sequences channel setup, spawn, handshake, reaping and teardown.
#[derive(Debug, Clone)]
pub struct ParentCoordinator {
    config: Configuration,
}

impl ParentCoordinator {
    /// Validate the configuration and build a coordinator for it.
    pub fn new(config: Configuration) -> Result<Self, LauncherError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Run the launch against the real system.
    pub fn run(&self) -> Result<RunReport, LauncherError> {
        let mut system = LinuxSystem::new();
        self.run_with(&mut system)
    }

    /// Run the launch; the child bootstraps through `system`.
    pub fn run_with<S: SystemOps>(&self, system: &mut S) -> Result<RunReport, LauncherError> {
        let config = &self.config;

        let check = check_dependencies(config.capabilities);
        for warning in &check.warnings {
            tracing::warn!("Parent: {}", warning);
        }
        check.into_result()?;

        debug_log!("Parent: PID of parent is {}", std::process::id());

        let channel = if config.ipc_requested {
            let channel = IpcChannel::create(&config.channel.name, config.channel.bounds)?;
            debug_log!("Parent: opening message queue {}", channel.name());
            Some(OwnedChannel::creator(channel))
        } else {
            None
        };

        // On a spawn failure the guard still closes and unlinks the channel.
        let launcher = ProcessLauncher::new(config.capabilities);
        let child = launcher.spawn(move || ChildBootstrapper::new(config, &mut *system).run() as isize)?;
        let spawned_at = SystemTime::now();
        let child_pid = child.pid().as_raw();
        debug_log!("Parent: PID of child is {}", child_pid);

        let handshake = match channel {
            Some(ref channel) => self.await_handshake(channel, spawned_at),
            None => HandshakeOutcome::NotRequested,
        };

        let exit = child.wait()?;
        debug_log!("Parent: child exited with status {}", exit.code());

        if let Some(channel) = channel {
            for failure in channel.teardown() {
                tracing::warn!("Parent: {}", failure);
            }
        }

        debug_log!("Parent: finishing up");
        Ok(RunReport {
            child_pid,
            handshake,
            exit,
        })
    }

    fn await_handshake(&self, channel: &IpcChannel, spawned_at: SystemTime) -> HandshakeOutcome {
        let deadline = handshake_deadline(spawned_at, self.config.handshake_timeout);
        match channel.receive_with_deadline(deadline) {
            Ok(message) => {
                debug_log!("Parent: received message from child ({} bytes)", message.len());
                HandshakeOutcome::Received(message)
            }
            Err(ChannelError::Timeout { .. }) => {
                tracing::warn!(
                    "Parent: no message from the child within {}s",
                    self.config.handshake_timeout.as_secs()
                );
                HandshakeOutcome::TimedOut
            }
            Err(e) => {
                tracing::warn!("Parent: {}", e);
                HandshakeOutcome::Failed(e)
            }
        }
    }
}
