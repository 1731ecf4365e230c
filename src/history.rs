//! Offline queries over the packet log.
//!
//! Each logged payload is re-run through the frame reconstructor and the
//! decoder; rows are filtered by optional inclusive address and time
//! ranges and aggregated per address.

use std::collections::BTreeMap;

use serde::Serialize;
use time::PrimitiveDateTime;

use crate::decoder::{self, DecodedFrame, Pdu};
use crate::frame::split_frames;
use crate::packet_log::{parse_timestamp, LogEntry};

/// Row output is truncated to this many most recent matches; aggregates
/// still cover everything that matched.
pub const MAX_HISTORY_ROWS: usize = 1000;

/// Parses a decimal or `0x`-prefixed hexadecimal register address.
pub fn parse_address(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    if let Some(digits) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u16::from_str_radix(digits, 16).ok()
    } else {
        raw.parse().ok()
    }
}

/// Optional inclusive bounds on address and timestamp.
///
/// Inverted ranges are swapped at construction and reported through
/// `notices` so the caller can surface them.
#[derive(Clone, Debug, Default)]
pub struct HistoryFilter {
    start_address: Option<u16>,
    end_address: Option<u16>,
    start_time: Option<PrimitiveDateTime>,
    end_time: Option<PrimitiveDateTime>,
    constrained: bool,
    notices: Vec<String>,
}

impl HistoryFilter {
    pub fn from_query(
        start: Option<&str>,
        end: Option<&str>,
        start_ts: Option<&str>,
        end_ts: Option<&str>,
    ) -> Self {
        let raw = [start, end, start_ts, end_ts].map(|value| value.unwrap_or("").trim());
        let constrained = raw.iter().any(|value| !value.is_empty());
        let mut notices = Vec::new();

        let mut start_address = parse_address(raw[0]);
        let mut end_address = parse_address(raw[1]);
        if let (Some(low), Some(high)) = (start_address, end_address) {
            if high < low {
                (start_address, end_address) = (Some(high), Some(low));
                notices.push("Address range inverted: bounds swapped.".to_string());
            }
        }

        let mut start_time = parse_time_filter(raw[2], &mut notices);
        let mut end_time = parse_time_filter(raw[3], &mut notices);
        if let (Some(low), Some(high)) = (start_time, end_time) {
            if high < low {
                (start_time, end_time) = (Some(high), Some(low));
                notices.push("Time range inverted: bounds swapped.".to_string());
            }
        }

        Self {
            start_address,
            end_address,
            start_time,
            end_time,
            constrained,
            notices,
        }
    }

    fn matches(&self, address: u16, timestamp: Option<PrimitiveDateTime>) -> bool {
        if self.start_address.is_some_and(|low| address < low) {
            return false;
        }
        if self.end_address.is_some_and(|high| address > high) {
            return false;
        }
        if let Some(low) = self.start_time {
            if !timestamp.is_some_and(|at| at >= low) {
                return false;
            }
        }
        if let Some(high) = self.end_time {
            if !timestamp.is_some_and(|at| at <= high) {
                return false;
            }
        }
        true
    }
}

fn parse_time_filter(raw: &str, notices: &mut Vec<String>) -> Option<PrimitiveDateTime> {
    if raw.is_empty() {
        return None;
    }
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        notices.push(format!(
            "Invalid timestamp '{raw}' (use YYYY-MM-DD HH:MM:SS)."
        ));
    }
    parsed
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDirection {
    Request,
    Response,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryRow {
    pub timestamp: String,
    pub address: u16,
    pub address_hex: String,
    pub raw_value: u16,
    pub value_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<WriteDirection>,
}

impl HistoryRow {
    fn new(timestamp: &str, address: u16, raw_value: u16, direction: Option<WriteDirection>) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            address,
            address_hex: format!("0x{address:04X}"),
            raw_value,
            value_hex: format!("0x{raw_value:04X}"),
            direction,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct AddressStats {
    pub count: u64,
    pub min: u16,
    pub max: u16,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryReport {
    pub rows: Vec<HistoryRow>,
    pub stats: BTreeMap<u16, AddressStats>,
    pub notices: Vec<String>,
    pub total_matches: usize,
}

/// Decodes one log entry, falling back to a single best-effort frame when
/// no CRC-valid frame is found, so truncated captures still surface.
fn decode_entry(payload: &[u8]) -> Vec<DecodedFrame> {
    if payload.is_empty() {
        return Vec::new();
    }
    let (frames, _leftover) = split_frames(payload);
    if !frames.is_empty() {
        return frames.iter().map(decoder::decode).collect();
    }
    if payload.len() < 3 {
        return Vec::new();
    }
    let pdu = if payload.len() >= 4 {
        &payload[2..payload.len() - 2]
    } else {
        &payload[2..]
    };
    vec![decoder::decode_parts(payload[0], payload[1], pdu)]
}

/// Extracts FC03 register reads, newest entries first.
///
/// Within one log entry a read request supplies the base address for the
/// next response; a response without one falls back to address zero.
pub fn read_history(entries: &[LogEntry], filter: &HistoryFilter) -> HistoryReport {
    let mut matched = Vec::new();

    for entry in entries.iter().rev() {
        let timestamp = parse_timestamp(&entry.timestamp);
        let mut pending: Option<u16> = None;
        for frame in decode_entry(&entry.payload) {
            if frame.function_code() != 3 || frame.is_exception() {
                continue;
            }
            match frame.pdu {
                Pdu::ReadRequest { start_address, .. } => pending = Some(start_address),
                Pdu::RegisterResponse { ref values } if !values.is_empty() => {
                    let base = pending.take().unwrap_or(0);
                    for (offset, &raw_value) in values.iter().enumerate() {
                        let address = base.wrapping_add(offset as u16);
                        if filter.matches(address, timestamp) {
                            matched.push(HistoryRow::new(&entry.timestamp, address, raw_value, None));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    build_report(matched, filter, "No FC03 reads found in the packet log.")
}

/// Extracts FC06 single-register writes, newest entries first.
///
/// A write followed by its byte-identical echo within the same entry is
/// labelled request then response.
pub fn write_history(entries: &[LogEntry], filter: &HistoryFilter) -> HistoryReport {
    let mut matched = Vec::new();

    for entry in entries.iter().rev() {
        let timestamp = parse_timestamp(&entry.timestamp);
        let mut pending: Option<(u16, u16)> = None;
        for frame in decode_entry(&entry.payload) {
            if frame.function_code() != 6 || frame.is_exception() {
                continue;
            }
            let Pdu::WriteSingle { address, value } = frame.pdu else {
                continue;
            };
            let direction = if pending == Some((address, value)) {
                pending = None;
                WriteDirection::Response
            } else {
                pending = Some((address, value));
                WriteDirection::Request
            };
            if filter.matches(address, timestamp) {
                matched.push(HistoryRow::new(
                    &entry.timestamp,
                    address,
                    value,
                    Some(direction),
                ));
            }
        }
    }

    build_report(matched, filter, "No FC06 writes found in the packet log.")
}

fn build_report(
    matched: Vec<HistoryRow>,
    filter: &HistoryFilter,
    empty_message: &str,
) -> HistoryReport {
    let mut stats: BTreeMap<u16, AddressStats> = BTreeMap::new();
    for row in &matched {
        stats
            .entry(row.address)
            .and_modify(|entry| {
                entry.count += 1;
                entry.min = entry.min.min(row.raw_value);
                entry.max = entry.max.max(row.raw_value);
            })
            .or_insert(AddressStats {
                count: 1,
                min: row.raw_value,
                max: row.raw_value,
            });
    }

    let mut notices = filter.notices.clone();
    if matched.is_empty() {
        notices.push(if filter.constrained {
            "No rows match the requested filters.".to_string()
        } else {
            empty_message.to_string()
        });
    }

    let total_matches = matched.len();
    let mut rows = matched;
    rows.truncate(MAX_HISTORY_ROWS);

    HistoryReport {
        rows,
        stats,
        notices,
        total_matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut bytes = body.to_vec();
        bytes.extend_from_slice(&crc16(body).to_le_bytes());
        bytes
    }

    fn entry(timestamp: &str, payload: Vec<u8>) -> LogEntry {
        LogEntry {
            timestamp: timestamp.to_string(),
            payload,
        }
    }

    fn read_pair(start: u16, values: &[u16]) -> Vec<u8> {
        let mut request = vec![0x01, 0x03];
        request.extend_from_slice(&start.to_be_bytes());
        request.extend_from_slice(&(values.len() as u16).to_be_bytes());
        let mut response = vec![0x01, 0x03, (values.len() * 2) as u8];
        for value in values {
            response.extend_from_slice(&value.to_be_bytes());
        }
        let mut payload = framed(&request);
        payload.extend(framed(&response));
        payload
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("100"), Some(100));
        assert_eq!(parse_address("0x64"), Some(0x64));
        assert_eq!(parse_address("0X0010"), Some(16));
        assert_eq!(parse_address(" 7 "), Some(7));
        assert_eq!(parse_address("bogus"), None);
        assert_eq!(parse_address(""), None);
    }

    #[test]
    fn test_reads_pair_request_with_response() {
        let entries = vec![entry("2025-07-01 10:00:00", read_pair(0x10, &[10, 20]))];
        let report = read_history(&entries, &HistoryFilter::default());

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].address, 0x10);
        assert_eq!(report.rows[0].raw_value, 10);
        assert_eq!(report.rows[1].address, 0x11);
        assert_eq!(report.rows[1].raw_value, 20);
        assert_eq!(report.rows[0].address_hex, "0x0010");
    }

    #[test]
    fn test_reads_without_request_start_at_zero() {
        let response = framed(&[0x01, 0x03, 0x02, 0x00, 0xFF]);
        let entries = vec![entry("2025-07-01 10:00:00", response)];
        let report = read_history(&entries, &HistoryFilter::default());

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].address, 0);
        assert_eq!(report.rows[0].raw_value, 255);
    }

    #[test]
    fn test_newest_entries_come_first() {
        let entries = vec![
            entry("2025-07-01 10:00:00", read_pair(1, &[11])),
            entry("2025-07-01 10:00:05", read_pair(2, &[22])),
        ];
        let report = read_history(&entries, &HistoryFilter::default());

        assert_eq!(report.rows[0].address, 2);
        assert_eq!(report.rows[1].address, 1);
    }

    #[test]
    fn test_address_filter_is_inclusive() {
        let entries = vec![entry("2025-07-01 10:00:00", read_pair(10, &[1, 2, 3, 4]))];
        let filter = HistoryFilter::from_query(Some("11"), Some("12"), None, None);
        let report = read_history(&entries, &filter);

        let addresses: Vec<u16> = report.rows.iter().map(|row| row.address).collect();
        assert_eq!(addresses, vec![11, 12]);
        assert_eq!(report.total_matches, 2);
    }

    #[test]
    fn test_inverted_address_range_is_swapped_with_notice() {
        let entries = vec![entry("2025-07-01 10:00:00", read_pair(10, &[1, 2, 3, 4]))];
        let filter = HistoryFilter::from_query(Some("0x0C"), Some("11"), None, None);
        let report = read_history(&entries, &filter);

        let addresses: Vec<u16> = report.rows.iter().map(|row| row.address).collect();
        assert_eq!(addresses, vec![11, 12]);
        assert!(report
            .notices
            .iter()
            .any(|notice| notice == "Address range inverted: bounds swapped."));
    }

    #[test]
    fn test_time_filter_and_inversion() {
        let entries = vec![
            entry("2025-07-01 10:00:00", read_pair(1, &[11])),
            entry("2025-07-01 10:00:10", read_pair(2, &[22])),
        ];
        let filter = HistoryFilter::from_query(
            None,
            None,
            Some("2025-07-01 10:00:15"),
            Some("2025-07-01 10:00:05"),
        );
        let report = read_history(&entries, &filter);

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].address, 2);
        assert!(report
            .notices
            .iter()
            .any(|notice| notice == "Time range inverted: bounds swapped."));
    }

    #[test]
    fn test_invalid_timestamp_gets_a_notice() {
        let filter = HistoryFilter::from_query(None, None, Some("yesterday"), None);
        assert!(filter
            .notices
            .iter()
            .any(|notice| notice.contains("Invalid timestamp 'yesterday'")));
    }

    #[test]
    fn test_empty_result_notices() {
        let report = read_history(&[], &HistoryFilter::default());
        assert!(report
            .notices
            .iter()
            .any(|notice| notice == "No FC03 reads found in the packet log."));

        let filter = HistoryFilter::from_query(Some("5"), None, None, None);
        let report = read_history(&[], &filter);
        assert!(report
            .notices
            .iter()
            .any(|notice| notice == "No rows match the requested filters."));
    }

    #[test]
    fn test_aggregates_cover_all_matches() {
        let entries = vec![
            entry("2025-07-01 10:00:00", read_pair(5, &[10])),
            entry("2025-07-01 10:00:01", read_pair(5, &[30])),
            entry("2025-07-01 10:00:02", read_pair(5, &[20])),
        ];
        let report = read_history(&entries, &HistoryFilter::default());

        let stats = report.stats.get(&5).expect("stats for address 5");
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 30);
    }

    #[test]
    fn test_rows_truncate_but_stats_do_not() {
        // 10 entries x 120 registers = 1200 matches, above the row cap.
        let values: Vec<u16> = (0u16..120).collect();
        let entries: Vec<LogEntry> = (0..10)
            .map(|minute| {
                entry(
                    &format!("2025-07-01 10:{minute:02}:00"),
                    read_pair(0, &values),
                )
            })
            .collect();
        let report = read_history(&entries, &HistoryFilter::default());

        assert_eq!(report.rows.len(), MAX_HISTORY_ROWS);
        assert_eq!(report.total_matches, 1200);
        assert_eq!(report.stats.get(&0).map(|stats| stats.count), Some(10));
    }

    #[test]
    fn test_write_history_directions() {
        let mut payload = framed(&[0x01, 0x06, 0x00, 0x05, 0x00, 0x64]);
        payload.extend(framed(&[0x01, 0x06, 0x00, 0x05, 0x00, 0x64]));
        let entries = vec![entry("2025-07-01 10:00:00", payload)];
        let report = write_history(&entries, &HistoryFilter::default());

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].direction, Some(WriteDirection::Request));
        assert_eq!(report.rows[1].direction, Some(WriteDirection::Response));
        assert_eq!(report.rows[0].address, 5);
        assert_eq!(report.rows[0].raw_value, 100);
    }

    #[test]
    fn test_write_history_distinct_writes_are_both_requests() {
        let mut payload = framed(&[0x01, 0x06, 0x00, 0x05, 0x00, 0x64]);
        payload.extend(framed(&[0x01, 0x06, 0x00, 0x06, 0x00, 0x65]));
        let entries = vec![entry("2025-07-01 10:00:00", payload)];
        let report = write_history(&entries, &HistoryFilter::default());

        assert!(report
            .rows
            .iter()
            .all(|row| row.direction == Some(WriteDirection::Request)));
    }

    #[test]
    fn test_unframed_entry_decodes_best_effort() {
        // Response bytes with a mangled CRC: no valid frame, but the
        // fallback still extracts the values.
        let mut payload = framed(&[0x01, 0x03, 0x02, 0x00, 0x2A]);
        let last = payload.len() - 1;
        payload[last] ^= 0xFF;
        let entries = vec![entry("2025-07-01 10:00:00", payload)];
        let report = read_history(&entries, &HistoryFilter::default());

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].raw_value, 42);
    }
}
