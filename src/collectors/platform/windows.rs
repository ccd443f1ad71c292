use std::process::Command;

use log::debug;

/// `net session` only succeeds from an elevated prompt
pub(super) fn check_raw_socket_privileges() -> bool {
    match Command::new("net").args(["session"]).output() {
        Ok(output) => output.status.success(),
        Err(e) => {
            debug!("Failed to check administrator privileges: {}", e);
            false
        }
    }
}

pub(super) fn required_privileges() -> Vec<String> {
    vec!["Administrator".to_string()]
}
