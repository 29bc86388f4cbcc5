// Small shared helpers

/// Check a peer address for the `host:port` shape with a numeric port
pub(crate) fn valid_peer_addr(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains('/') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}
