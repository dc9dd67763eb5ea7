//! Linux backend: namespaces via clone(2), chroot jail, proc remount.

pub mod bootstrap;
pub mod launcher;
pub mod system;

use nix::sched::CloneFlags;

use crate::capability::{IsolationCapabilitySet, IsolationDomain};

pub use bootstrap::{ChildBootstrapper, PROC_DIR, PROC_DIR_MODE};
pub use launcher::{ChildExit, ChildProcess, ProcessLauncher, CHILD_STACK_SIZE};
pub use system::{HandshakeSink, LinuxSystem, MountRequest, SystemOps};

/// Namespace flag for a single domain.
pub fn domain_flag(domain: IsolationDomain) -> CloneFlags {
    match domain {
        IsolationDomain::ProcessIdView => CloneFlags::CLONE_NEWPID,
        IsolationDomain::MountView => CloneFlags::CLONE_NEWNS,
        IsolationDomain::HostnameView => CloneFlags::CLONE_NEWUTS,
        IsolationDomain::NetworkView => CloneFlags::CLONE_NEWNET,
        IsolationDomain::IpcView => CloneFlags::CLONE_NEWIPC,
    }
}

/// Translate a capability set into clone(2) namespace flags.
pub fn clone_flags(capabilities: IsolationCapabilitySet) -> CloneFlags {
    capabilities
        .domains()
        .fold(CloneFlags::empty(), |flags, domain| flags | domain_flag(domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_has_no_flags() {
        assert!(clone_flags(IsolationCapabilitySet::new()).is_empty());
    }

    #[test]
    fn test_clone_flags_mapping() {
        let set = IsolationCapabilitySet::new()
            .with(IsolationDomain::ProcessIdView)
            .with(IsolationDomain::MountView);
        assert_eq!(
            clone_flags(set),
            CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNS
        );

        let all: IsolationCapabilitySet = IsolationDomain::ALL.into_iter().collect();
        assert_eq!(
            clone_flags(all),
            CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWUTS
                | CloneFlags::CLONE_NEWNET
                | CloneFlags::CLONE_NEWIPC
        );
    }
}
