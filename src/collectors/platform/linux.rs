use std::process::Command;

use log::{debug, trace};

/// Root, or a binary carrying `cap_net_raw`
pub(super) fn check_raw_socket_privileges() -> bool {
    if nix::unistd::getuid().is_root() {
        return true;
    }

    let output = match Command::new("getcap").arg("/proc/self/exe").output() {
        Ok(output) => output,
        Err(e) => {
            debug!("Failed to check capabilities with getcap: {}", e);
            return false;
        }
    };

    let capabilities = String::from_utf8_lossy(&output.stdout);
    trace!("getcap reported: {}", capabilities.trim());
    capabilities.contains("cap_net_raw")
}

pub(super) fn required_privileges() -> Vec<String> {
    vec!["root or CAP_NET_RAW".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_privileges_name_net_raw() {
        assert!(required_privileges()[0].contains("CAP_NET_RAW"));
    }
}
