//! Isolation capability set.
//!
//! A value type naming which isolation domains a new process gets a private view of.
//! It carries no kernel constants; platform backends translate it when spawning.

use std::fmt;

use bitflags::bitflags;

/// A single isolation domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationDomain {
    /// Process-id numbering.
    ProcessIdView,
    /// Mount table.
    MountView,
    /// Hostname and NIS domain name.
    HostnameView,
    /// Network stack.
    NetworkView,
    /// IPC object namespace (message queues, semaphores, shared memory).
    IpcView,
}

impl IsolationDomain {
    /// All domains, in declaration order.
    pub const ALL: [IsolationDomain; 5] = [
        IsolationDomain::ProcessIdView,
        IsolationDomain::MountView,
        IsolationDomain::HostnameView,
        IsolationDomain::NetworkView,
        IsolationDomain::IpcView,
    ];

    /// Short lowercase name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            IsolationDomain::ProcessIdView => "pid",
            IsolationDomain::MountView => "mnt",
            IsolationDomain::HostnameView => "uts",
            IsolationDomain::NetworkView => "net",
            IsolationDomain::IpcView => "ipc",
        }
    }

    fn bit(self) -> DomainBits {
        match self {
            IsolationDomain::ProcessIdView => DomainBits::PROCESS_ID,
            IsolationDomain::MountView => DomainBits::MOUNT,
            IsolationDomain::HostnameView => DomainBits::HOSTNAME,
            IsolationDomain::NetworkView => DomainBits::NETWORK,
            IsolationDomain::IpcView => DomainBits::IPC,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    struct DomainBits: u8 {
        const PROCESS_ID = 1 << 0;
        const MOUNT      = 1 << 1;
        const HOSTNAME   = 1 << 2;
        const NETWORK    = 1 << 3;
        const IPC        = 1 << 4;
    }
}

/// The combination of isolation domains requested for a new process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IsolationCapabilitySet {
    bits: DomainBits,
}

impl IsolationCapabilitySet {
    /// An empty set: the child shares every view with its parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a domain to the set.
    pub fn add(&mut self, domain: IsolationDomain) {
        self.bits.insert(domain.bit());
    }

    /// Builder-style variant of [`add`](Self::add).
    pub fn with(mut self, domain: IsolationDomain) -> Self {
        self.add(domain);
        self
    }

    /// Whether the set contains the domain.
    pub fn contains(&self, domain: IsolationDomain) -> bool {
        self.bits.contains(domain.bit())
    }

    /// Raw bit value of the set.
    pub fn raw_value(&self) -> u8 {
        self.bits.bits()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Iterate over the contained domains in declaration order.
    pub fn domains(&self) -> impl Iterator<Item = IsolationDomain> + '_ {
        IsolationDomain::ALL
            .into_iter()
            .filter(move |domain| self.contains(*domain))
    }

    /// A fresh proc filesystem is only meaningful with both a private pid view and a
    /// private mount table.
    pub fn requires_proc_remount(&self) -> bool {
        self.contains(IsolationDomain::ProcessIdView) && self.contains(IsolationDomain::MountView)
    }
}

impl FromIterator<IsolationDomain> for IsolationCapabilitySet {
    fn from_iter<I: IntoIterator<Item = IsolationDomain>>(iter: I) -> Self {
        let mut set = Self::new();
        for domain in iter {
            set.add(domain);
        }
        set
    }
}

impl fmt::Display for IsolationCapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.domains().map(|d| d.name()).collect();
        write!(f, "{}", names.join(","))
    }
}
