//! Text codecs for the address-like values found in rules: IPv4/IPv6 addresses with their
//! masks, hardware addresses, interface names and layer 4 protocols.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnetwork::{ipv4_mask_to_prefix, ipv6_mask_to_prefix, Ipv4Network};
use thiserror::Error;

/// Length of an interface name buffer in the kernel structures, terminating NUL included.
pub const IFNAMSIZ: usize = 16;

/// Length of an Ethernet hardware address.
pub const ETH_ALEN: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("\"{0}\" is not a valid hardware address")]
pub struct InvalidMac(pub String);

/// A 6 bytes hardware address.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MacAddr(pub [u8; ETH_ALEN]);

impl MacAddr {
    pub fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = InvalidMac;

    /// Accepts six groups of one or two hexadecimal digits separated by colons, like
    /// `ether_aton(3)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; ETH_ALEN];
        let mut groups = s.split(':');
        for octet in octets.iter_mut() {
            let group = groups.next().ok_or_else(|| InvalidMac(s.to_string()))?;
            if group.is_empty() || group.len() > 2 {
                return Err(InvalidMac(s.to_string()));
            }
            *octet = u8::from_str_radix(group, 16).map_err(|_| InvalidMac(s.to_string()))?;
        }
        if groups.next().is_some() {
            return Err(InvalidMac(s.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Parses the mask of an `addr/mask` argument, given as a prefix length or in dotted form.
fn parse_ipv4_mask(text: &str) -> Option<Ipv4Addr> {
    if let Ok(prefix) = text.parse::<u8>() {
        return Ipv4Network::new(Ipv4Addr::UNSPECIFIED, prefix)
            .ok()
            .map(|net| net.mask());
    }
    Ipv4Addr::from_str(text).ok()
}

/// Parses an IPv4 address or a host name, with an optional `/mask` suffix that is applied to
/// the addresses. Host names may resolve to several addresses, in resolver order.
pub fn parse_ipv4_any(text: &str) -> Option<Vec<Ipv4Addr>> {
    let (host, mask) = match text.split_once('/') {
        Some((host, mask)) => (host, parse_ipv4_mask(mask)?),
        None => (text, Ipv4Addr::BROADCAST),
    };
    let mask = u32::from(mask);
    Some(
        resolve_ipv4(host)?
            .into_iter()
            .map(|addr| Ipv4Addr::from(u32::from(addr) & mask))
            .collect(),
    )
}

fn resolve_ipv4(host: &str) -> Option<Vec<Ipv4Addr>> {
    if host.is_empty() {
        return None;
    }
    if let Ok(addr) = Ipv4Addr::from_str(host) {
        return Some(vec![addr]);
    }
    debug!("Resolving host name {}", host);
    let addrs: Vec<Ipv4Addr> = dns_lookup::lookup_host(host)
        .ok()?
        .into_iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect();
    if addrs.is_empty() {
        None
    } else {
        Some(addrs)
    }
}

/// Renders an address, resolving it to a host name unless `numeric` is set. Falls back to the
/// numeric form when the reverse lookup fails.
pub fn ipaddr_to_anyname(addr: IpAddr, numeric: bool) -> String {
    if numeric {
        return addr.to_string();
    }
    dns_lookup::lookup_addr(&addr).unwrap_or_else(|_| addr.to_string())
}

/// Renders an address and its mask the way the save format expects: `/len` for contiguous
/// masks, a dotted mask otherwise.
pub fn format_ipv4_masked(addr: Ipv4Addr, mask: Ipv4Addr) -> String {
    match ipv4_mask_to_prefix(mask) {
        Ok(prefix) => format!("{}/{}", addr, prefix),
        Err(_) => format!("{}/{}", addr, mask),
    }
}

pub fn format_ipv6_masked(addr: Ipv6Addr, mask: Ipv6Addr) -> String {
    match ipv6_mask_to_prefix(mask) {
        Ok(prefix) => format!("{}/{}", addr, prefix),
        Err(_) => format!("{}/{}", addr, mask),
    }
}

/// An interface name as matched by a rule. A wildcard name matches every interface starting
/// with `name`, and is written `name+`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Iface {
    pub name: String,
    pub wildcard: bool,
}

impl Iface {
    pub fn new(name: &str) -> Self {
        match name.strip_suffix('+') {
            Some(prefix) => Iface {
                name: prefix.to_string(),
                wildcard: true,
            },
            None => Iface {
                name: name.to_string(),
                wildcard: false,
            },
        }
    }

    /// Rebuilds an interface from the name and mask buffers of a kernel entry. Returns `None`
    /// when the rule does not match on the interface.
    pub fn from_raw(name: &[u8], mask: &[u8]) -> Option<Self> {
        if mask.first().copied().unwrap_or(0) == 0 {
            return None;
        }
        let mut out = String::new();
        let mut wildcard = false;
        for i in 0..name.len().min(mask.len()) {
            if mask[i] != 0 {
                if name[i] != 0 {
                    out.push(name[i] as char);
                }
            } else {
                wildcard = name[i - 1] != 0;
                break;
            }
        }
        Some(Iface {
            name: out,
            wildcard,
        })
    }

    /// The name and mask buffers the kernel expects for this interface.
    pub fn to_raw(&self) -> ([u8; IFNAMSIZ], [u8; IFNAMSIZ]) {
        let mut name = [0u8; IFNAMSIZ];
        let mut mask = [0u8; IFNAMSIZ];
        let bytes = self.name.as_bytes();
        let len = bytes.len().min(IFNAMSIZ - 1);
        name[..len].copy_from_slice(&bytes[..len]);
        let masked = if self.wildcard { len } else { len + 1 };
        for m in mask.iter_mut().take(masked) {
            *m = 0xff;
        }
        (name, mask)
    }
}

impl fmt::Display for Iface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wildcard {
            write!(f, "{}+", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

const PROTOCOLS: &[(&str, u16)] = &[
    ("tcp", 6),
    ("sctp", 132),
    ("udp", 17),
    ("udplite", 136),
    ("icmp", 1),
    ("icmpv6", 58),
    ("esp", 50),
    ("ah", 51),
    ("mh", 135),
    ("all", 0),
];

/// Name of a layer 4 protocol, or its number when unknown.
pub fn protocol_name(proto: u16) -> String {
    PROTOCOLS
        .iter()
        .find(|(_, number)| *number == proto)
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| proto.to_string())
}
