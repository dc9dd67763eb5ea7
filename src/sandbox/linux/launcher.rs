//! Creating the isolated child with clone(2).

use nix::errno::Errno;
use nix::sched::clone;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::capability::IsolationCapabilitySet;
use crate::error::LaunchError;
use crate::sandbox::linux::clone_flags;

/// Size of the execution stack handed to the new process.
pub const CHILD_STACK_SIZE: usize = 64 * 1024;

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    Signaled(Signal),
}

impl ChildExit {
    pub fn success(&self) -> bool {
        matches!(self, ChildExit::Exited(0))
    }

    /// Shell-style status: the exit code, or 128 + signal number.
    pub fn code(&self) -> i32 {
        match self {
            ChildExit::Exited(code) => *code,
            ChildExit::Signaled(signal) => 128 + *signal as i32,
        }
    }
}

/// A running child and the stack it was started on.
///
/// The stack stays allocated until the child has been reaped.
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    stack: Vec<u8>,
    reaped: bool,
}

impl ChildProcess {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the child terminates, then release its stack.
    pub fn wait(mut self) -> Result<ChildExit, LaunchError> {
        let exit = loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => break ChildExit::Exited(code),
                Ok(WaitStatus::Signaled(_, signal, _)) => break ChildExit::Signaled(signal),
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(LaunchError::WaitFailed {
                        pid: self.pid.as_raw(),
                        reason: e.to_string(),
                    })
                }
            }
        };

        self.reaped = true;
        self.stack = Vec::new();
        tracing::debug!("Parent: child {} finished ({:?}), stack released", self.pid, exit);
        Ok(exit)
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if !self.reaped && !self.stack.is_empty() {
            // The kernel may still be running the child on this memory.
            tracing::warn!("Parent: child {} was never reaped; leaking its stack", self.pid);
            std::mem::forget(std::mem::take(&mut self.stack));
        }
    }
}

/// Spawns a child process enrolled in a set of isolation domains.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher {
    capabilities: IsolationCapabilitySet,
}

impl ProcessLauncher {
    pub fn new(capabilities: IsolationCapabilitySet) -> Self {
        Self { capabilities }
    }

    /// Start `entry` in a new process. The child exits with the value `entry`
    /// returns. Domains outside the capability set stay shared with the parent.
    ///
    /// Returns as soon as the child exists; it is reaped through
    /// [`ChildProcess::wait`].
    pub fn spawn<'a, F>(&self, entry: F) -> Result<ChildProcess, LaunchError>
    where
        F: FnMut() -> isize + 'a,
    {
        let mut stack = vec![0u8; CHILD_STACK_SIZE];
        let flags = clone_flags(self.capabilities);

        tracing::debug!(
            "Parent: cloning child into namespaces [{}] ({:?})",
            self.capabilities,
            flags
        );

        // SAFETY: the child gets a copy of the address space (no CLONE_VM), and
        // `stack` outlives it because it is only freed after waitpid.
        let pid = unsafe {
            clone(
                Box::new(entry),
                &mut stack,
                flags,
                Some(Signal::SIGCHLD as i32),
            )
        }
        .map_err(|e| LaunchError::SpawnFailed(e.to_string()))?;

        Ok(ChildProcess {
            pid,
            stack,
            reaped: false,
        })
    }
}
