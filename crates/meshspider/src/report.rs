//! Tabular exports and human-readable listings of a result map.
//!
//! The CSV files use `;` as delimiter and `\r\n` line endings, quoting only
//! fields that need it.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::ResultMap;
use crate::types::{ProbeOutcome, SpiderResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S+0";

const VERSION_FIELDS: [&str; 4] = ["timestamp", "address", "type", "version"];

const INTERFACE_FIELDS: [&str; 13] = [
    "timestamp",
    "address",
    "interface",
    "mac",
    "wlan",
    "ssid",
    "mode",
    "channel",
    "bssid",
    "ip4",
    "ip6",
    "signal",
    "noise",
];

pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

fn csv_field(value: &str) -> String {
    if value.contains([';', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_row<W: Write + ?Sized, S: AsRef<str>>(out: &mut W, fields: &[S]) -> SpiderResult<()> {
    let row: Vec<String> = fields.iter().map(|f| csv_field(f.as_ref())).collect();
    write!(out, "{}\r\n", row.join(";"))?;
    Ok(())
}

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// One row per successful node: `timestamp;address;type;version`.
pub fn write_version_statistics<W: Write + ?Sized>(
    results: &ResultMap,
    out: &mut W,
) -> SpiderResult<()> {
    write_row(out, &VERSION_FIELDS)?;
    for (node, outcome) in results {
        let Some(snapshot) = outcome.snapshot() else {
            continue;
        };
        write_row(
            out,
            &[
                format_timestamp(&snapshot.captured_at),
                node.to_string(),
                snapshot.backend.to_string(),
                snapshot.version.clone(),
            ],
        )?;
    }
    Ok(())
}

/// One row per interface of every successful node.
pub fn write_interface_info<W: Write + ?Sized>(
    results: &ResultMap,
    out: &mut W,
) -> SpiderResult<()> {
    write_row(out, &INTERFACE_FIELDS)?;
    for (node, outcome) in results {
        let Some(snapshot) = outcome.snapshot() else {
            continue;
        };
        let timestamp = format_timestamp(&snapshot.captured_at);
        for iface in &snapshot.interfaces {
            let ip4: Vec<String> = iface.inet4.iter().map(|i| i.addr.to_string()).collect();
            let ip6: Vec<String> = iface.inet6.iter().map(|i| i.addr.to_string()).collect();
            let wlan = iface.wlan.as_ref();
            write_row(
                out,
                &[
                    timestamp.clone(),
                    node.to_string(),
                    iface.name.clone(),
                    opt(&iface.link),
                    if wlan.is_some() { "True" } else { "False" }.to_string(),
                    wlan.map(|w| opt(&w.ssid)).unwrap_or_default(),
                    wlan.map(|w| opt(&w.mode)).unwrap_or_default(),
                    wlan.map(|w| opt(&w.channel)).unwrap_or_default(),
                    wlan.map(|w| opt(&w.bssid)).unwrap_or_default(),
                    ip4.join(" "),
                    ip6.join(" "),
                    wlan.map(|w| opt(&w.signal)).unwrap_or_default(),
                    wlan.map(|w| opt(&w.noise)).unwrap_or_default(),
                ],
            )?;
        }
    }
    Ok(())
}

/// Per-node listing; level 1 is one line per node, level 2 and above adds
/// interfaces and addresses of every snapshot.
pub fn write_listing<W: Write + ?Sized>(
    results: &ResultMap,
    level: u8,
    out: &mut W,
) -> SpiderResult<()> {
    for (node, outcome) in results {
        if level > 1 {
            writeln!(out, "{:<15}", node.to_string())?;
            writeln!(out, "{}", "=".repeat(15))?;
            match outcome {
                ProbeOutcome::Success(snapshot) => writeln!(out, "{}", snapshot.verbose_repr())?,
                ProbeOutcome::Failure { .. } => writeln!(out, "Failure: {outcome}")?,
            }
        } else {
            writeln!(out, "{:<15}: {outcome}", node.to_string())?;
        }
    }
    Ok(())
}

/// Counts per backend family and failure kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultStats {
    pub total: usize,
    pub by_backend: BTreeMap<String, usize>,
    pub by_failure: BTreeMap<String, usize>,
}

impl ResultStats {
    pub fn collect(results: &ResultMap) -> Self {
        let mut stats = Self {
            total: results.len(),
            ..Default::default()
        };
        for outcome in results.values() {
            match outcome {
                ProbeOutcome::Success(s) => {
                    *stats.by_backend.entry(s.backend.to_string()).or_default() += 1
                }
                ProbeOutcome::Failure { kind, .. } => {
                    *stats.by_failure.entry(kind.to_string()).or_default() += 1
                }
            }
        }
        stats
    }
}

impl fmt::Display for ResultStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} nodes", self.total)?;
        for (backend, n) in &self.by_backend {
            writeln!(f, "  {backend:<16} {n}")?;
        }
        for (kind, n) in &self.by_failure {
            writeln!(f, "  {kind:<16} {n}")?;
        }
        Ok(())
    }
}
