//! Bootstrap sequence run inside the freshly cloned child.
//!
//! Stages run in a fixed order: handshake, jail, proc remount, hostname, exec.
//! The handshake comes first so the prompt still sees the caller's terminal and
//! files; the jail comes before the proc mount because it may have to create
//! `/proc`. Only a jail failure or an exec failure ends the child early.

use std::path::{Path, PathBuf};

use crate::capability::IsolationDomain;
use crate::channel::IpcMessage;
use crate::config::Configuration;
use crate::debug_log;
use crate::error::BootstrapError;
use crate::sandbox::linux::system::{HandshakeSink, MountRequest, SystemOps};

/// Mount point of the proc filesystem.
pub const PROC_DIR: &str = "/proc";

/// Permissions for a `/proc` created inside a jail (r-x for everyone).
pub const PROC_DIR_MODE: u32 = 0o555;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;

/// Drives the child through its setup stages.
pub struct ChildBootstrapper<'a, S: SystemOps> {
    config: &'a Configuration,
    system: &'a mut S,
}

impl<'a, S: SystemOps> ChildBootstrapper<'a, S> {
    pub fn new(config: &'a Configuration, system: &'a mut S) -> Self {
        Self { config, system }
    }

    /// Run every configured stage and return the child's exit status.
    ///
    /// When a command is configured and exec succeeds this never returns.
    pub fn run(&mut self) -> i32 {
        let config = self.config;
        debug_log!(" Child: PID of child is {}", std::process::id());

        if config.ipc_requested {
            self.handshake();
        }

        if let Err(e) = self.jail() {
            tracing::error!(" Child: {}", e);
            return EXIT_FAILURE;
        }

        self.remount_proc();
        self.assign_hostname();

        match config.command {
            Some(ref command) => {
                let e = self.exec_command(command);
                tracing::error!(" Child: {}", e);
                EXIT_FAILURE
            }
            None => EXIT_SUCCESS,
        }
    }

    /// Send one line of terminal input to the parent. Never fatal.
    fn handshake(&mut self) {
        let settings = &self.config.channel;
        debug_log!(" Child: opening message queue {}", settings.name);

        let sink = match self.system.open_channel(settings) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!(" Child: {}", e);
                return;
            }
        };

        let limit = sink.max_message_size().saturating_sub(1);
        match self.system.prompt_line(limit) {
            Ok(Some(line)) => {
                debug_log!(" Child: sending message to parent");
                let message = IpcMessage::from_line(&line, limit);
                if let Err(e) = sink.send_message(&message) {
                    tracing::warn!(" Child: {}", e);
                }
            }
            Ok(None) => tracing::warn!(" Child: no input to send to the parent"),
            Err(e) => tracing::warn!(" Child: reading message failed: {}", e),
        }

        debug_log!(" Child: closing message queue {}", settings.name);
        if let Err(e) = sink.finish() {
            tracing::warn!(" Child: {}", e);
        }
    }

    /// Change root into the jail directory. Every failure here is fatal.
    fn jail(&mut self) -> Result<(), BootstrapError> {
        let Some(ref path) = self.config.jail_path else {
            return Ok(());
        };

        debug_log!(" Child: creating chroot jail at {}", path.display());
        self.system
            .chroot(path)
            .map_err(|source| BootstrapError::Jail {
                step: "chroot",
                source,
            })?;

        debug_log!(" Child: changing directory into chroot jail");
        self.system
            .chdir(Path::new("/"))
            .map_err(|source| BootstrapError::Jail {
                step: "chdir",
                source,
            })?;

        let proc_dir = Path::new(PROC_DIR);
        if !self.system.exists(proc_dir) {
            debug_log!(" Child: creating {} inside the jail", PROC_DIR);
            self.system
                .mkdir(proc_dir, PROC_DIR_MODE)
                .map_err(|source| BootstrapError::Jail {
                    step: "mkdir /proc",
                    source,
                })?;
        }

        Ok(())
    }

    /// Mount a fresh proc filesystem, only when both the pid and mount views are
    /// private. Failures degrade isolation but are not fatal.
    fn remount_proc(&mut self) {
        if !self.config.capabilities.requires_proc_remount() {
            return;
        }

        if !self.config.jail_requested() {
            // Keep the new proc mount from propagating to the host.
            let request = MountRequest::MakePrivate {
                target: PathBuf::from("/"),
            };
            if let Err(e) = self.system.mount(&request) {
                tracing::warn!(" Child: making mounts private failed: {}", e);
            }
        }

        debug_log!(" Child: mounting proc filesystem at {}", PROC_DIR);
        let request = MountRequest::Proc {
            target: PathBuf::from(PROC_DIR),
        };
        if let Err(e) = self.system.mount(&request) {
            tracing::warn!(" Child: mounting {} failed: {}", PROC_DIR, e);
        }
    }

    fn assign_hostname(&mut self) {
        if !self.config.capabilities.contains(IsolationDomain::HostnameView) {
            return;
        }
        let Some(ref hostname) = self.config.hostname else {
            return;
        };

        debug_log!(" Child: setting hostname to {}", hostname);
        if let Err(e) = self.system.set_hostname(hostname) {
            tracing::warn!(" Child: setting hostname failed: {}", e);
        }
    }

    /// Clear the environment and exec. Returns only if exec failed.
    fn exec_command(&mut self, command: &[String]) -> BootstrapError {
        if let Err(e) = self.system.clear_env() {
            tracing::warn!(" Child: couldn't clear environment: {}", e);
        }

        debug_log!(" Child: executing command {} ...", shell_words::join(command));
        let source = self.system.exec(command);
        BootstrapError::Exec {
            command: command.first().cloned().unwrap_or_default(),
            source,
        }
    }
}
