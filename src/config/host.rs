//! Local host lookups the node configuration depends on.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};
use tracing::warn;

/// HostResolver supplies the node's hostname and the address it serves on.
pub trait HostResolver {
    fn hostname(&self) -> String;

    /// Returns the address peers reach `hostname` on, if one can be found.
    fn local_ip(&self, hostname: &str) -> Option<IpAddr>;
}

/// StaticHostResolver returns fixed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticHostResolver {
    pub hostname: String,
    pub ip: Option<IpAddr>,
}

impl StaticHostResolver {
    pub fn new(hostname: impl Into<String>, ip: IpAddr) -> Self {
        StaticHostResolver {
            hostname: hostname.into(),
            ip: Some(ip),
        }
    }
}

impl HostResolver for StaticHostResolver {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn local_ip(&self, _hostname: &str) -> Option<IpAddr> {
        self.ip
    }
}

/// SystemHostResolver asks the operating system.
///
/// The local IP is the first non-loopback address the hostname resolves to,
/// falling back to the source address of the default route.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostResolver;

/// Hostname used when the OS reports none.
pub const FALLBACK_HOSTNAME: &str = "edge-node";

impl HostResolver for SystemHostResolver {
    fn hostname(&self) -> String {
        match hostname::get().map(|h| h.into_string()) {
            Ok(Ok(name)) if !name.is_empty() => name.to_ascii_lowercase(),
            Ok(_) => FALLBACK_HOSTNAME.to_string(),
            Err(e) => {
                warn!(error = %e, "failed to read hostname");
                FALLBACK_HOSTNAME.to_string()
            }
        }
    }

    fn local_ip(&self, hostname: &str) -> Option<IpAddr> {
        let resolved = (hostname, 0)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.find(|a| !a.ip().is_loopback()))
            .map(|a| a.ip());
        resolved.or_else(default_route_ip)
    }
}

/// Connecting a UDP socket sends nothing but selects the outbound interface.
fn default_route_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 53)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_resolver() {
        let r = StaticHostResolver::new("edge-1", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(r.hostname(), "edge-1");
        assert_eq!(r.local_ip("anything"), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
    }

    #[test]
    fn test_system_hostname_not_empty() {
        assert!(!SystemHostResolver.hostname().is_empty());
    }
}
