//! Platform-specific isolation backends.

#[cfg(target_os = "linux")]
pub mod linux;

use std::path::Path;

use crate::capability::{IsolationCapabilitySet, IsolationDomain};
use crate::error::LauncherError;
use crate::utils::namespaces_supported;

/// Directory where the kernel exposes the namespaces of the calling process.
pub const NAMESPACE_DIR: &str = "/proc/self/ns";

/// Result of checking that the host can provide the requested isolation.
#[derive(Debug, Clone, Default)]
pub struct SandboxDependencyCheck {
    /// Problems that prevent the launch.
    pub errors: Vec<String>,
    /// Problems that only degrade it.
    pub warnings: Vec<String>,
}

impl SandboxDependencyCheck {
    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert to Result, returning error if there are any errors.
    pub fn into_result(self) -> Result<Self, LauncherError> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(LauncherError::UnsupportedPlatform(self.errors.join(", ")))
        }
    }
}

/// Check that the platform is supported and that every requested namespace kind
/// exists on this kernel.
pub fn check_dependencies(capabilities: IsolationCapabilitySet) -> SandboxDependencyCheck {
    check_dependencies_in(capabilities, Path::new(NAMESPACE_DIR))
}

fn check_dependencies_in(
    capabilities: IsolationCapabilitySet,
    namespace_dir: &Path,
) -> SandboxDependencyCheck {
    let mut result = SandboxDependencyCheck::default();

    if !namespaces_supported() {
        result
            .errors
            .push("namespaces are not available on this platform".to_string());
        return result;
    }

    if capabilities.is_empty() {
        return result;
    }

    if !namespace_dir.is_dir() {
        result.warnings.push(format!(
            "{} is not readable; namespace support not verified",
            namespace_dir.display()
        ));
        return result;
    }

    for domain in capabilities.domains() {
        if !namespace_dir.join(namespace_file(domain)).exists() {
            result
                .errors
                .push(format!("kernel has no {} namespace support", domain.name()));
        }
    }

    result
}

/// Entry name under `/proc/<pid>/ns` for a domain.
pub fn namespace_file(domain: IsolationDomain) -> &'static str {
    domain.name()
}
