//! Trace report wire format
//!
//! One report is a fixed 8192-byte buffer: a big-endian 16-bit record
//! count followed by 8-byte records. A record is either a timestamp
//! (`ff xx t5 t4 t3 t2 t1 t0`) or bus data (`id pos d0 d1 d2 d3 d4 d5`).
//! Fields are extracted explicitly; nothing is reinterpreted in place.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Size of one report as returned by the device
pub const REPORT_BUFFER_LENGTH: usize = 8192;
/// Number of reports fetched per trace read
pub const REPORT_BUFFER_COUNT: usize = 8;
/// Size of one record
pub const RECORD_LENGTH: usize = 8;
/// Bytes of bus payload carried by a data record
pub const RECORD_PAYLOAD_LENGTH: usize = 6;
/// Upper bound on records decoded from one report
pub const MAX_RECORDS_PER_REPORT: usize = 1022;
/// First byte of a timestamp record
pub const TIMESTAMP_MARKER: u8 = 0xff;

const HEADER_LENGTH: usize = 2;

/// One decoded trace record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceRecord {
    /// 48-bit tick counter (100 MHz)
    Timestamp(u64),
    /// Bus bytes belonging to command `id`
    Data {
        /// Running command id assigned by the device
        id: u8,
        /// Position cursor, advances by 16 per record and wraps at 256
        position: u8,
        /// Up to six bus bytes
        payload: [u8; RECORD_PAYLOAD_LENGTH],
    },
}

impl TraceRecord {
    /// Parse one 8-byte record
    pub fn parse(raw: &[u8; RECORD_LENGTH]) -> Self {
        if raw[0] == TIMESTAMP_MARKER {
            let ticks = raw[2..]
                .iter()
                .fold(0u64, |acc, &b| (acc << 8) | b as u64);
            return TraceRecord::Timestamp(ticks);
        }

        let mut payload = [0u8; RECORD_PAYLOAD_LENGTH];
        payload.copy_from_slice(&raw[2..]);
        TraceRecord::Data {
            id: raw[0],
            position: raw[1],
            payload,
        }
    }

    /// Encode the record back into its wire form
    pub fn to_bytes(&self) -> [u8; RECORD_LENGTH] {
        let mut raw = [0u8; RECORD_LENGTH];
        match *self {
            TraceRecord::Timestamp(ticks) => {
                raw[0] = TIMESTAMP_MARKER;
                raw[2..].copy_from_slice(&ticks.to_be_bytes()[2..]);
            }
            TraceRecord::Data {
                id,
                position,
                payload,
            } => {
                raw[0] = id;
                raw[1] = position;
                raw[2..].copy_from_slice(&payload);
            }
        }
        raw
    }
}

/// A validated report buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceReport {
    data: Vec<u8>,
}

impl TraceReport {
    /// Wrap a buffer received from the device
    ///
    /// Anything but exactly [`REPORT_BUFFER_LENGTH`] bytes is a transport
    /// error and must abort the batch.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() != REPORT_BUFFER_LENGTH {
            return Err(Error::ShortResponse {
                expected: REPORT_BUFFER_LENGTH,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    /// A report that declares no records
    pub fn empty() -> Self {
        Self {
            data: vec![0u8; REPORT_BUFFER_LENGTH],
        }
    }

    /// Record count as written by the device
    pub fn declared_count(&self) -> usize {
        u16::from_be_bytes([self.data[0], self.data[1]]) as usize
    }

    /// Record count that will actually be decoded
    pub fn record_count(&self) -> usize {
        self.declared_count().min(MAX_RECORDS_PER_REPORT)
    }

    /// Whether the device declared more records than can be decoded
    pub fn is_overfull(&self) -> bool {
        self.declared_count() > MAX_RECORDS_PER_REPORT
    }

    /// Iterate over the decodable records
    pub fn records(&self) -> impl Iterator<Item = TraceRecord> + '_ {
        self.data[HEADER_LENGTH..]
            .chunks_exact(RECORD_LENGTH)
            .take(self.record_count())
            .filter_map(|chunk| <&[u8; RECORD_LENGTH]>::try_from(chunk).ok())
            .map(TraceRecord::parse)
    }

    /// Raw report bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Builds report buffers in the device's wire format
///
/// Used by the software emulator and by tests to script bus traffic.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    records: Vec<TraceRecord>,
    declared: Option<u16>,
}

impl ReportBuilder {
    /// Start an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timestamp record
    pub fn timestamp(mut self, ticks: u64) -> Self {
        self.records.push(TraceRecord::Timestamp(ticks & 0xffff_ffff_ffff));
        self
    }

    /// Append a raw data record
    pub fn data(mut self, id: u8, position: u8, payload: &[u8]) -> Self {
        let mut bytes = [0u8; RECORD_PAYLOAD_LENGTH];
        let len = payload.len().min(RECORD_PAYLOAD_LENGTH);
        bytes[..len].copy_from_slice(&payload[..len]);
        self.records.push(TraceRecord::Data {
            id,
            position,
            payload: bytes,
        });
        self
    }

    /// Append the records for one complete bus command
    ///
    /// `bus_bytes` is everything the master clocked out: opcode, address,
    /// dummy bytes and data. Bytes are packed six to a record with the
    /// position cursor advanced the way the device does it.
    pub fn command(mut self, id: u8, bus_bytes: &[u8]) -> Self {
        let mut cursor = 0u8;
        for chunk in bus_bytes.chunks(RECORD_PAYLOAD_LENGTH) {
            let position = cursor.wrapping_add((chunk.len() * 8) as u8);
            self = self.data(id, position, chunk);
            cursor = position.wrapping_add(0x10);
        }
        self
    }

    /// Override the record count written into the header
    pub fn declared_count(mut self, count: u16) -> Self {
        self.declared = Some(count);
        self
    }

    /// Number of records appended so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records have been appended
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Produce the 8192-byte report buffer
    ///
    /// Records that do not fit into the buffer are dropped.
    pub fn build(&self) -> Vec<u8> {
        let mut data = vec![0u8; REPORT_BUFFER_LENGTH];
        let capacity = (REPORT_BUFFER_LENGTH - HEADER_LENGTH) / RECORD_LENGTH;
        let stored = self.records.len().min(capacity);
        let declared = self.declared.unwrap_or(stored as u16);
        data[..HEADER_LENGTH].copy_from_slice(&declared.to_be_bytes());

        for (i, record) in self.records.iter().take(stored).enumerate() {
            let start = HEADER_LENGTH + i * RECORD_LENGTH;
            data[start..start + RECORD_LENGTH].copy_from_slice(&record.to_bytes());
        }
        data
    }

    /// Produce a validated report
    pub fn report(&self) -> TraceReport {
        TraceReport {
            data: self.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_record() {
        let raw = [0xff, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(
            TraceRecord::parse(&raw),
            TraceRecord::Timestamp(0x0102_0304_0506)
        );
    }

    #[test]
    fn test_parse_data_record() {
        let raw = [0x07, 0x30, 0x03, 0x12, 0x34, 0x56, 0xaa, 0xbb];
        assert_eq!(
            TraceRecord::parse(&raw),
            TraceRecord::Data {
                id: 0x07,
                position: 0x30,
                payload: [0x03, 0x12, 0x34, 0x56, 0xaa, 0xbb],
            }
        );
    }

    #[test]
    fn test_report_length_checked() {
        assert_eq!(
            TraceReport::from_bytes(vec![0u8; 100]),
            Err(Error::ShortResponse {
                expected: REPORT_BUFFER_LENGTH,
                actual: 100
            })
        );
        assert!(TraceReport::from_bytes(vec![0u8; REPORT_BUFFER_LENGTH]).is_ok());
    }

    #[test]
    fn test_count_clamped() {
        let report = ReportBuilder::new().declared_count(0xffff).report();
        assert_eq!(report.declared_count(), 0xffff);
        assert_eq!(report.record_count(), MAX_RECORDS_PER_REPORT);
        assert!(report.is_overfull());
        // All records decode from inside the buffer
        assert_eq!(report.records().count(), MAX_RECORDS_PER_REPORT);
    }

    #[test]
    fn test_command_positions() {
        let report = ReportBuilder::new()
            .command(1, &[0x03, 0x00, 0x10, 0x00, 0xaa, 0xbb, 0xcc, 0xdd])
            .report();
        let records: Vec<_> = report.records().collect();
        assert_eq!(records.len(), 2);
        match (records[0], records[1]) {
            (
                TraceRecord::Data { position: p0, .. },
                TraceRecord::Data { position: p1, .. },
            ) => {
                assert_eq!(p0, 0x30);
                assert_eq!(p1, 0x40 + 0x10);
            }
            _ => panic!("expected data records"),
        }
    }
}
