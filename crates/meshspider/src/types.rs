//! Core data types for probe results.

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one probed node.
///
/// Ordered numerically by address (10.0.0.2 before 10.0.0.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(IpAddr);

impl NodeAddress {
    pub fn new(ip: IpAddr) -> Self {
        Self(ip)
    }

    pub fn ip(&self) -> IpAddr {
        self.0
    }

    /// Base URL of the node's web interface, honouring a port override.
    pub fn site_url(&self, port: Option<u16>) -> String {
        let host = match self.0 {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        match port {
            Some(port) => format!("http://{host}:{port}"),
            None => format!("http://{host}"),
        }
    }
}

impl From<IpAddr> for NodeAddress {
    fn from(ip: IpAddr) -> Self {
        Self(ip)
    }
}

impl From<Ipv4Addr> for NodeAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self(IpAddr::V4(ip))
    }
}

impl FromStr for NodeAddress {
    type Err = SpiderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<IpAddr>()
            .map(Self)
            .map_err(|e| SpiderError::Usage(format!("invalid node address '{s}': {e}")))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The closed set of management web-interface families a node may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Bare olsrd httpinfo plugin page.
    #[serde(rename = "OLSR")]
    Olsr,
    /// LuCI whose header carries only `p`/`h1` elements.
    #[serde(rename = "OpenWRT")]
    OpenWrt,
    /// LuCI "Backfire" flavour.
    #[serde(rename = "Backfire")]
    Backfire,
    /// Classic Freifunk firmware.
    #[serde(rename = "Freifunk")]
    Freifunk,
    /// Ubiquiti / 0xffolsr router firmware.
    #[serde(rename = "Router_OS")]
    RouterOs,
}

impl Backend {
    pub const ALL: [Backend; 5] = [
        Backend::Olsr,
        Backend::OpenWrt,
        Backend::Backfire,
        Backend::Freifunk,
        Backend::RouterOs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Olsr => "OLSR",
            Backend::OpenWrt => "OpenWRT",
            Backend::Backfire => "Backfire",
            Backend::Freifunk => "Freifunk",
            Backend::RouterOs => "Router_OS",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An IPv4 address bound to an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inet4 {
    pub addr: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
    pub broadcast: Option<Ipv4Addr>,
}

impl Inet4 {
    pub fn new(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            netmask: None,
            broadcast: None,
        }
    }
}

/// An IPv6 address bound to an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inet6 {
    pub addr: Ipv6Addr,
    pub prefix: Option<u8>,
}

/// Wireless parameters of an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WlanInfo {
    pub ssid: Option<String>,
    pub mode: Option<String>,
    pub channel: Option<String>,
    pub bssid: Option<String>,
    pub signal: Option<i32>,
    pub noise: Option<i32>,
}

/// A network interface as reported by a node's status pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub index: u32,
    pub mtu: Option<u32>,
    pub is_wlan: bool,
    pub inet4: Vec<Inet4>,
    pub inet6: Vec<Inet6>,
    pub wlan: Option<WlanInfo>,
    /// Link-layer (MAC) address.
    pub link: Option<String>,
}

impl Interface {
    pub fn new(index: u32, name: impl Into<String>, mtu: Option<u32>) -> Self {
        Self {
            name: name.into(),
            index,
            mtu,
            is_wlan: false,
            inet4: Vec::new(),
            inet6: Vec::new(),
            wlan: None,
            link: None,
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interface {} ({})", self.name, self.index)?;
        if let Some(mtu) = self.mtu {
            write!(f, " mtu {mtu}")?;
        }
        if let Some(link) = &self.link {
            write!(f, " link {link}")?;
        }
        for i4 in &self.inet4 {
            write!(f, " inet {}", i4.addr)?;
        }
        for i6 in &self.inet6 {
            write!(f, " inet6 {}", i6.addr)?;
        }
        if let Some(w) = &self.wlan {
            write!(
                f,
                " wlan ssid={} mode={} channel={} bssid={}",
                w.ssid.as_deref().unwrap_or("-"),
                w.mode.as_deref().unwrap_or("-"),
                w.channel.as_deref().unwrap_or("-"),
                w.bssid.as_deref().unwrap_or("-"),
            )?;
        } else if self.is_wlan {
            write!(f, " wlan")?;
        }
        Ok(())
    }
}

/// Structured result of a successful probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub backend: Backend,
    pub version: String,
    pub interfaces: Vec<Interface>,
    /// Globally routable addresses only.
    pub addresses: BTreeSet<IpAddr>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Multi-line dump of interfaces and addresses.
    pub fn verbose_repr(&self) -> String {
        let mut lines = vec![self.to_string()];
        lines.extend(self.interfaces.iter().map(|i| i.to_string()));
        lines.extend(self.addresses.iter().map(|a| a.to_string()));
        lines.join("\n")
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Version: {}", self.backend, self.version)
    }
}

/// Why a probe did not produce a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    TransportError,
    InvalidResponse,
    InternalError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "Timeout",
            FailureKind::TransportError => "TransportError",
            FailureKind::InvalidResponse => "InvalidResponse",
            FailureKind::InternalError => "InternalError",
        };
        f.write_str(s)
    }
}

/// The single outcome recorded for a node in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success(Snapshot),
    Failure { kind: FailureKind, detail: String },
}

impl ProbeOutcome {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        ProbeOutcome::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            ProbeOutcome::Success(s) => Some(s),
            ProbeOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ProbeOutcome::Success(_) => None,
            ProbeOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<SpiderError> for ProbeOutcome {
    fn from(e: SpiderError) -> Self {
        ProbeOutcome::failure(e.kind(), e.to_string())
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success(s) => s.fmt(f),
            ProbeOutcome::Failure { kind, detail } => write!(f, "{kind}: {detail}"),
        }
    }
}

/// Errors that can occur while probing, storing or reconciling.
#[derive(thiserror::Error, Debug)]
pub enum SpiderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SpiderError {
    /// How this error is recorded when it ends a probe.
    pub fn kind(&self) -> FailureKind {
        match self {
            SpiderError::Transport(_) | SpiderError::Io(_) => FailureKind::TransportError,
            SpiderError::InvalidResponse(_) | SpiderError::Parse(_) => {
                FailureKind::InvalidResponse
            }
            SpiderError::Timeout(_) => FailureKind::Timeout,
            SpiderError::Internal(_)
            | SpiderError::Usage(_)
            | SpiderError::Storage(_)
            | SpiderError::Json(_) => FailureKind::InternalError,
        }
    }
}

impl From<reqwest::Error> for SpiderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SpiderError::Transport(format!("request timed out: {e}"))
        } else {
            SpiderError::Transport(e.to_string())
        }
    }
}

/// Convenience result type.
pub type SpiderResult<T> = Result<T, SpiderError>;
