//! Result dump reader/writer.
//!
//! A dump is a fixed 32 byte header followed by a JSON payload of
//! `(node, outcome)` entries. Paths ending in `.gz` are written
//! gzip-compressed; readers detect compression from the stream itself.

use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::store::ResultMap;
use crate::types::{NodeAddress, ProbeOutcome, SpiderError, SpiderResult};

/// Magic bytes: "SPDR"
const DUMP_MAGIC: u32 = 0x53504452;

/// Current format version.
const FORMAT_VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 32;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Path meaning "read from stdin".
pub const STDIN_PATH: &str = "-";

/// A loaded dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Dump {
    pub created_at: DateTime<Utc>,
    pub results: ResultMap,
}

pub struct DumpWriter;

pub struct DumpReader;

impl DumpWriter {
    /// Write `results` to `path`, gzip-compressed when it ends in `.gz`.
    pub fn write_to_file(results: &ResultMap, path: &Path) -> SpiderResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::File::create(path)?;
        if path.extension().is_some_and(|e| e == "gz") {
            let mut gz = GzEncoder::new(file, Compression::best());
            Self::write_to(results, &mut gz)?;
            gz.finish()?;
        } else {
            Self::write_to(results, &mut file)?;
        }
        Ok(())
    }

    pub fn write_to<W: Write>(results: &ResultMap, writer: &mut W) -> SpiderResult<()> {
        let entries: Vec<EntryRef<'_>> = results
            .iter()
            .map(|(node, outcome)| EntryRef { node, outcome })
            .collect();
        let payload = serde_json::to_vec(&SerializedDump { entries })
            .map_err(|e| SpiderError::Storage(format!("Serialization failed: {e}")))?;

        let mut header = [0u8; HEADER_SIZE];
        write_u32(&mut header[0..4], DUMP_MAGIC);
        write_u16(&mut header[4..6], FORMAT_VERSION);
        write_u16(&mut header[6..8], 0); // flags
        write_u64(&mut header[8..16], results.len() as u64);
        write_u64(&mut header[16..24], Utc::now().timestamp() as u64);
        write_u64(&mut header[24..32], payload.len() as u64);

        writer.write_all(&header)?;
        writer.write_all(&payload)?;
        Ok(())
    }
}

impl DumpReader {
    /// Read a dump from `path`, or from stdin when the path is `-`.
    pub fn read_from_path(path: &str) -> SpiderResult<Dump> {
        if path == STDIN_PATH {
            let stdin = std::io::stdin();
            let mut lock = stdin.lock();
            return Self::read_from(&mut lock);
        }
        let mut file = std::fs::File::open(path)?;
        Self::read_from(&mut file)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> SpiderResult<Dump> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let bytes = if raw.starts_with(&GZIP_MAGIC) {
            let mut out = Vec::new();
            GzDecoder::new(&raw[..])
                .read_to_end(&mut out)
                .map_err(|e| SpiderError::Storage(format!("Corrupt gzip stream: {e}")))?;
            out
        } else {
            raw
        };

        if bytes.len() < HEADER_SIZE {
            return Err(SpiderError::Storage(format!(
                "Truncated header: {} bytes",
                bytes.len()
            )));
        }
        let header = &bytes[..HEADER_SIZE];

        let magic = read_u32(&header[0..4]);
        if magic != DUMP_MAGIC {
            return Err(SpiderError::Storage(format!(
                "Invalid magic: expected 0x{DUMP_MAGIC:08X}, got 0x{magic:08X}"
            )));
        }

        let version = read_u16(&header[4..6]);
        if version != FORMAT_VERSION {
            return Err(SpiderError::Storage(format!(
                "Unsupported version: {version}"
            )));
        }

        let entry_count = read_u64(&header[8..16]) as usize;
        let created_at = read_u64(&header[16..24]) as i64;
        let payload_len = read_u64(&header[24..32]) as usize;

        let payload = bytes
            .get(HEADER_SIZE..HEADER_SIZE.saturating_add(payload_len))
            .ok_or_else(|| SpiderError::Storage("Truncated payload".into()))?;
        let serialized: DeserializedDump = serde_json::from_slice(payload)
            .map_err(|e| SpiderError::Storage(format!("Deserialization failed: {e}")))?;

        if serialized.entries.len() != entry_count {
            return Err(SpiderError::Storage(format!(
                "Entry count mismatch: header says {entry_count}, payload has {}",
                serialized.entries.len()
            )));
        }

        Ok(Dump {
            created_at: Utc
                .timestamp_opt(created_at, 0)
                .single()
                .unwrap_or_default(),
            results: serialized
                .entries
                .into_iter()
                .map(|e| (e.node, e.outcome))
                .collect(),
        })
    }
}

#[derive(Serialize)]
struct EntryRef<'a> {
    node: &'a NodeAddress,
    outcome: &'a ProbeOutcome,
}

#[derive(Serialize)]
struct SerializedDump<'a> {
    entries: Vec<EntryRef<'a>>,
}

#[derive(Deserialize)]
struct Entry {
    node: NodeAddress,
    outcome: ProbeOutcome,
}

#[derive(Deserialize)]
struct DeserializedDump {
    entries: Vec<Entry>,
}

// Little-endian byte helpers
fn write_u16(buf: &mut [u8], val: u16) {
    buf[..2].copy_from_slice(&val.to_le_bytes());
}
fn write_u32(buf: &mut [u8], val: u32) {
    buf[..4].copy_from_slice(&val.to_le_bytes());
}
fn write_u64(buf: &mut [u8], val: u64) {
    buf[..8].copy_from_slice(&val.to_le_bytes());
}
fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}
fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
fn read_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}
