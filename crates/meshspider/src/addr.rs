//! Address classification helpers.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::OnceLock;

use ipnet::IpNet;

/// Ranges never reported as routable node addresses.
fn unroutable() -> &'static [IpNet] {
    static NETS: OnceLock<Vec<IpNet>> = OnceLock::new();
    NETS.get_or_init(|| {
        [
            "0.0.0.0/8",
            "10.0.0.0/8",
            "100.64.0.0/10", // shared address space
            "127.0.0.0/8",
            "169.254.0.0/16",
            "172.16.0.0/12",
            "192.0.2.0/24",
            "192.168.0.0/16",
            "198.51.100.0/24",
            "203.0.113.0/24",
            "224.0.0.0/4",
            "255.255.255.255/32",
            "::/128",
            "::1/128",
            "2001:db8::/32",
            "fc00::/7",
            "fe80::/10",
            "ff00::/8",
        ]
        .into_iter()
        .map(|cidr| cidr.parse().expect("valid CIDR"))
        .collect()
    })
}

/// Whether an address may appear in a snapshot's routable address set.
pub fn is_routable(ip: IpAddr) -> bool {
    !unroutable().iter().any(|net| net.contains(&ip))
}

pub fn is_routable_v4(ip: Ipv4Addr) -> bool {
    is_routable(IpAddr::V4(ip))
}
