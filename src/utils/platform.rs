//! Platform detection utilities.

/// Whether this kernel can create the namespaces the launcher uses.
/// Returns false off Linux and on WSL1, which translates syscalls and has no
/// namespace support.
pub fn namespaces_supported() -> bool {
    cfg!(target_os = "linux") && get_wsl_version().as_deref() != Some("1")
}

/// Get the WSL version (1 or 2+) if running in WSL.
/// Returns None if not running in WSL.
///
/// Looks for an explicit "WSL<n>" marker in /proc/version; a bare "microsoft"
/// kernel string (e.g. "4.4.0-19041-Microsoft") is WSL1.
pub fn get_wsl_version() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let proc_version = std::fs::read_to_string("/proc/version").ok()?;
        parse_wsl_version_from_string(&proc_version)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(any(target_os = "linux", test))]
fn parse_wsl_version_from_string(proc_version: &str) -> Option<String> {
    let proc_lower = proc_version.to_lowercase();

    if let Some(pos) = proc_lower.find("wsl") {
        if let Some(ch) = proc_lower[pos + 3..].chars().next() {
            if ch.is_ascii_digit() {
                return Some(ch.to_string());
            }
        }
    }

    if proc_lower.contains("microsoft") {
        return Some("1".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_supported_matches_wsl_version() {
        let expected = cfg!(target_os = "linux") && get_wsl_version().as_deref() != Some("1");
        assert_eq!(namespaces_supported(), expected);
    }

    #[test]
    fn test_wsl_version_parsing_wsl2() {
        let wsl2 = "Linux version 5.15.90.1-microsoft-standard-WSL2 (oe-user@oe-host)";
        assert_eq!(parse_wsl_version_from_string(wsl2), Some("2".to_string()));

        let wsl2_upper = "Linux version 5.15.90.1-MICROSOFT-STANDARD-WSL2";
        assert_eq!(parse_wsl_version_from_string(wsl2_upper), Some("2".to_string()));
    }

    #[test]
    fn test_wsl_version_parsing_wsl1() {
        let wsl1 = "Linux version 4.4.0-19041-Microsoft (Microsoft@Microsoft.com)";
        assert_eq!(parse_wsl_version_from_string(wsl1), Some("1".to_string()));
    }

    #[test]
    fn test_wsl_version_parsing_native_linux() {
        let native = "Linux version 6.2.0-26-generic (buildd@ubuntu)";
        assert_eq!(parse_wsl_version_from_string(native), None);
        assert_eq!(parse_wsl_version_from_string(""), None);
    }
}
