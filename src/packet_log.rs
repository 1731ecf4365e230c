//! Append-only packet log: one `timestamp,hex_payload` line per inbound
//! payload.
//!
//! Writes are serialised through a single mutex and the file is
//! opened-appended-closed on every line, so a crash can lose at most the
//! line being written. The reader is tolerant: whitespace inside the hex
//! payload is ignored, lines without a comma or with bad hex are skipped.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::warn;

/// Wall-clock format used for log lines and history filters.
pub const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Current wall-clock time as `YYYY-MM-DD HH:MM:SS`, in the local offset
/// when it can be determined, UTC otherwise.
pub fn now_timestamp() -> String {
    let now = match UtcOffset::current_local_offset() {
        Ok(offset) => OffsetDateTime::now_utc().to_offset(offset),
        Err(_) => OffsetDateTime::now_utc(),
    };
    now.format(TIMESTAMP_FORMAT).unwrap_or_default()
}

pub fn parse_timestamp(text: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(text.trim(), TIMESTAMP_FORMAT).ok()
}

/// Renders a payload as uppercase space-separated hex (`01 03 00 0A`).
pub fn format_payload(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (index, byte) in data.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Decodes a hex payload, accepting both spaced and unspaced forms.
pub fn parse_payload(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.split_whitespace().collect();
    if compact.is_empty() {
        return Some(Vec::new());
    }
    hex::decode(compact).ok()
}

/// One parsed log line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct PacketLog {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl PacketLog {
    /// A log without a path is a no-op sink; captures run fine without
    /// persistence.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, timestamp: &str, payload: &[u8]) {
        let Some(path) = &self.path else {
            return;
        };
        let line = format!("{timestamp},{}\n", format_payload(payload));

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(error) = result {
            warn!("Failed to append to packet log {}: {error}", path.display());
        }
    }

    /// Rereads the whole log in arrival order.
    pub fn read_entries(&self) -> Vec<LogEntry> {
        let Some(path) = &self.path else {
            return Vec::new();
        };

        let contents = {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            match std::fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
                Err(error) => {
                    warn!("Failed to read packet log {}: {error}", path.display());
                    return Vec::new();
                }
            }
        };

        contents.lines().filter_map(parse_line).collect()
    }
}

fn parse_line(line: &str) -> Option<LogEntry> {
    if line.is_empty() {
        return None;
    }
    let (timestamp, hex_payload) = line.split_once(',')?;
    let payload = parse_payload(hex_payload)?;
    Some(LogEntry {
        timestamp: timestamp.to_string(),
        payload,
    })
}
