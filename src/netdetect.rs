use std::net::Ipv4Addr;
use std::path::Path;
use if_addrs::{get_if_addrs, IfAddr, Interface};
use ipnet::Ipv4Net;
use tracing::debug;
use crate::traits::{NetPath, NetworkPaths};

/// Wired and wireless uplinks identified by interface name.
#[derive(Debug, Clone)]
pub struct InterfacePaths {
    pub wired: String,
    pub wireless: String,
}

impl InterfacePaths {
    pub fn new(wired: impl Into<String>, wireless: impl Into<String>) -> Self {
        Self {
            wired: wired.into(),
            wireless: wireless.into(),
        }
    }

    fn name(&self, path: NetPath) -> &str {
        match path {
            NetPath::Wired => &self.wired,
            NetPath::Wireless => &self.wireless,
        }
    }
}

impl NetworkPaths for InterfacePaths {
    fn is_up(&self, path: NetPath) -> bool {
        self.local_address(path).is_some()
    }

    fn local_address(&self, path: NetPath) -> Option<Ipv4Addr> {
        let ifaces = match get_if_addrs() {
            Ok(ifaces) => ifaces,
            Err(e) => {
                debug!(error = %e, "interface enumeration failed");
                return None;
            }
        };
        first_ipv4(&ifaces, self.name(path))
    }
}

/// First usable IPv4 address bound to the named interface.
fn first_ipv4(ifaces: &[Interface], name: &str) -> Option<Ipv4Addr> {
    ifaces
        .iter()
        .filter(|iface| iface.name == name)
        .find_map(|iface| match &iface.addr {
            IfAddr::V4(v4) if usable(v4.ip) => Some(v4.ip),
            _ => None,
        })
}

fn usable(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified() && !ip.is_link_local()
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    Ipv4Net::new(net, 24).expect("/24 is always valid")
}

/// Hardware address of `iface` as uppercase hex without separators, read
/// from sysfs. `None` on non-Linux hosts or unknown interfaces.
pub fn mac_address(iface: &str) -> Option<String> {
    let path = Path::new("/sys/class/net").join(iface).join("address");
    let raw = std::fs::read_to_string(path).ok()?;
    normalize_mac(&raw)
}

fn normalize_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect::<String>()
        .to_ascii_uppercase();
    if hex.len() == 12 && hex.chars().all(|c| c.is_ascii_hexdigit()) && hex != "000000000000" {
        Some(hex)
    } else {
        None
    }
}
