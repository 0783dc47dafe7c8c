//! Host network provider.
//!
//! On host systems the OS handles connectivity; this provider only detects
//! the local IPv4 address the discovery protocol should announce.

use super::{NetworkError, NetworkProvider};
use log::info;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Host network provider for tests and the host binary.
pub struct HostNetwork {
    ip_addr: Option<Ipv4Addr>,
}

impl HostNetwork {
    pub fn new() -> Self {
        Self { ip_addr: None }
    }

    /// Get the primary local IPv4 address.
    ///
    /// "Connects" a UDP socket to a public address (no packet is sent) and
    /// reads back which local address the default route chose.
    fn detect_local_ip() -> Option<Ipv4Addr> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        }
    }
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProvider for HostNetwork {
    fn connect(&mut self) -> Result<Ipv4Addr, NetworkError> {
        let ip = Self::detect_local_ip().unwrap_or(Ipv4Addr::LOCALHOST);
        self.ip_addr = Some(ip);
        info!("host network ready, local IP: {}", ip);
        Ok(ip)
    }

    fn is_connected(&self) -> bool {
        // The OS keeps the link up; socket operations surface real failures.
        true
    }

    fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.ip_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_network_always_connected() {
        let network = HostNetwork::new();
        assert!(network.is_connected());
    }

    #[test]
    fn test_connect_yields_an_address() {
        let mut network = HostNetwork::new();
        let ip = network.connect().unwrap();
        assert_eq!(network.ip_addr(), Some(ip));
    }
}
