use log::trace;

/// Raw ICMP sockets require root on macOS
pub(super) fn check_raw_socket_privileges() -> bool {
    let uid = unsafe { libc::getuid() };
    trace!("Effective uid: {}", uid);
    uid == 0
}

pub(super) fn required_privileges() -> Vec<String> {
    vec!["root".to_string()]
}
