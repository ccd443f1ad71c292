//! Platform-specific privilege checks and interface naming rules
//!
//! Raw ICMP sockets need elevated privileges everywhere; how to detect them
//! differs per operating system. The quality aggregator asks here before it
//! switches a round to privileged echo mode.

pub mod interface_kind;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

pub use interface_kind::{InterfaceKind, Platform};

/// Whether the current process may open raw ICMP sockets
///
/// This may spawn a short helper command, so async callers should run it
/// on a blocking thread.
pub fn has_raw_socket_privileges() -> bool {
    #[cfg(target_os = "linux")]
    {
        linux::check_raw_socket_privileges()
    }

    #[cfg(target_os = "macos")]
    {
        macos::check_raw_socket_privileges()
    }

    #[cfg(target_os = "windows")]
    {
        windows::check_raw_socket_privileges()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        false
    }
}

/// Human-readable names of the privileges raw sockets need on this platform
pub fn required_privileges() -> Vec<String> {
    #[cfg(target_os = "linux")]
    {
        linux::required_privileges()
    }

    #[cfg(target_os = "macos")]
    {
        macos::required_privileges()
    }

    #[cfg(target_os = "windows")]
    {
        windows::required_privileges()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        vec!["unsupported platform".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_privileges_are_named() {
        assert!(!required_privileges().is_empty());
    }

    #[test]
    fn test_privilege_check_does_not_panic() {
        let _ = has_raw_socket_privileges();
    }
}
