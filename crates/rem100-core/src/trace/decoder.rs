//! Trace decoder
//!
//! Turns batches of [`TraceReport`]s into [`BusEvent`]s. All bookkeeping
//! that has to survive between batches lives in [`DecoderState`], which
//! the caller owns and threads through successive calls.
//!
//! The device tags every data record with a running command id and an
//! 8-bit position cursor. A change of id starts a new bus command; the
//! cursor delta tells how many of the record's six payload bytes are new.

use alloc::vec::Vec;

use super::report::{TraceRecord, TraceReport, RECORD_PAYLOAD_LENGTH};
use crate::bridge::PendingWriteRequest;
use crate::error::{Error, Result};
use crate::spi::{Classifier, CommandDescriptor, COMMANDS};

/// Command ids never equal this, so the first data record always starts
/// a new command.
const NO_COMMAND: u8 = 0xff;

/// Cursor distance between consecutive records
const CURSOR_STEP: u8 = 0x10;

/// Opcode plus 24-bit address
const ADDRESS_HEADER_LENGTH: usize = 4;

/// Payload bytes per output line, the address advances by this much
const LINE_LENGTH: usize = 16;

const ADDRESS_MASK: u32 = 0x00ff_ffff;

/// Something observed on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The device's 100 MHz tick counter
    Timestamp(u64),
    /// A new SPI command began
    CommandStart {
        /// Device command id
        id: u8,
        /// Number of commands seen so far in this session, starting at 1
        sequence: u32,
        /// Ticks since the first command of the session
        elapsed: u64,
        /// Opcode byte
        opcode: u8,
        /// Classification of the opcode
        descriptor: &'static CommandDescriptor,
        /// 24-bit address, for commands that carry one
        address: Option<u32>,
    },
    /// One payload byte
    Data {
        /// Address of the 16-byte line this byte belongs to
        address: Option<u32>,
        /// The byte
        byte: u8,
    },
    /// A page program was closed out by the next command
    WriteComplete(PendingWriteRequest),
    /// The device declared more records than a report can hold
    ReportClamped {
        /// Record count the device declared
        declared: usize,
    },
}

#[derive(Debug, Clone)]
struct WriteCapture {
    offset: u32,
    data: Vec<u8>,
}

/// Decoder bookkeeping carried across batches
///
/// One instance belongs to one trace stream.
#[derive(Debug, Clone)]
pub struct DecoderState {
    command_id: u8,
    cursor: u8,
    counter: u32,
    timestamp: u64,
    start_timestamp: u64,
    address: u32,
    additional_pad_bytes: usize,
    out_bytes: usize,
    descriptor: &'static CommandDescriptor,
    classifier: Classifier,
    write: Option<WriteCapture>,
}

impl Default for DecoderState {
    fn default() -> Self {
        Self {
            command_id: NO_COMMAND,
            cursor: 0,
            counter: 0,
            timestamp: 0,
            start_timestamp: 0,
            address: 0,
            additional_pad_bytes: 0,
            out_bytes: 0,
            descriptor: &COMMANDS[2],
            classifier: Classifier::new(),
            write: None,
        }
    }
}

impl DecoderState {
    /// Fresh state for a new trace stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the command currently being decoded
    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    /// Number of commands decoded so far
    pub fn command_count(&self) -> u32 {
        self.counter
    }

    /// Current position cursor
    pub fn cursor(&self) -> u8 {
        self.cursor
    }

    /// Last timestamp seen
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Timestamp of the first command
    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp
    }

    /// Tracked SPI address
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Whether a page program is being accumulated
    pub fn write_in_progress(&self) -> bool {
        self.write.is_some()
    }

    /// Close out a page program still in progress
    ///
    /// Normally a write completes when the next command starts. At the end
    /// of a session this hands over whatever has been collected.
    pub fn flush(&mut self) -> Option<PendingWriteRequest> {
        self.write
            .take()
            .map(|w| PendingWriteRequest::new(w.offset, w.data))
    }

    /// Decode a single record, appending the resulting events
    pub fn decode_record(&mut self, record: TraceRecord, events: &mut Vec<BusEvent>) -> Result<()> {
        let (id, position, payload) = match record {
            TraceRecord::Timestamp(ticks) => {
                self.timestamp = ticks;
                self.additional_pad_bytes = 0;
                events.push(BusEvent::Timestamp(ticks));
                return Ok(());
            }
            TraceRecord::Data {
                id,
                position,
                payload,
            } => (id, position, payload),
        };

        let mut skip = core::mem::take(&mut self.additional_pad_bytes);

        if id != self.command_id {
            skip = self.start_command(id, &payload, events);
        }

        let blocklen = (position.wrapping_sub(self.cursor) / 8) as usize;
        let blocklen = blocklen.min(RECORD_PAYLOAD_LENGTH);

        if skip < blocklen {
            for &byte in &payload[skip..blocklen] {
                self.emit_byte(byte, events)?;
            }
        }

        self.cursor = position.wrapping_add(CURSOR_STEP);
        Ok(())
    }

    /// Begin a new command, returning how many header bytes to skip
    fn start_command(
        &mut self,
        id: u8,
        payload: &[u8; RECORD_PAYLOAD_LENGTH],
        events: &mut Vec<BusEvent>,
    ) -> usize {
        if let Some(write) = self.flush() {
            events.push(BusEvent::WriteComplete(write));
        }

        let opcode = payload[0];
        let descriptor = self.classifier.classify(opcode);

        let mut skip = 1;
        let mut address = None;
        if descriptor.uses_address {
            let a = u32::from_be_bytes([0, payload[1], payload[2], payload[3]]);
            self.address = a;
            address = Some(a);

            skip = ADDRESS_HEADER_LENGTH + descriptor.pad_bytes as usize;
            if skip > RECORD_PAYLOAD_LENGTH {
                self.additional_pad_bytes = skip - RECORD_PAYLOAD_LENGTH;
                skip = RECORD_PAYLOAD_LENGTH;
            }
        }

        if self.counter == 0 {
            self.start_timestamp = self.timestamp;
        }
        self.counter = self.counter.wrapping_add(1);
        self.command_id = id;
        self.descriptor = descriptor;
        self.cursor = 0;
        self.out_bytes = 0;

        if descriptor.is_page_program() {
            self.write = Some(WriteCapture {
                offset: self.address,
                data: Vec::new(),
            });
        }

        log::trace!(
            "command #{} id {:#04x}: {:#04x} ({})",
            self.counter,
            id,
            opcode,
            descriptor.name
        );

        events.push(BusEvent::CommandStart {
            id,
            sequence: self.counter,
            elapsed: self.timestamp.wrapping_sub(self.start_timestamp),
            opcode,
            descriptor,
            address,
        });

        skip
    }

    fn emit_byte(&mut self, byte: u8, events: &mut Vec<BusEvent>) -> Result<()> {
        let uses_address = self.descriptor.uses_address;
        events.push(BusEvent::Data {
            address: uses_address.then_some(self.address),
            byte,
        });

        if let Some(write) = self.write.as_mut() {
            write.data.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
            write.data.push(byte);
        }

        self.out_bytes += 1;
        if self.out_bytes == LINE_LENGTH {
            self.out_bytes = 0;
            if uses_address {
                self.address = self.address.wrapping_add(LINE_LENGTH as u32) & ADDRESS_MASK;
            }
        }
        Ok(())
    }

    /// Decode one report
    pub fn decode_report(&mut self, report: &TraceReport, events: &mut Vec<BusEvent>) -> Result<()> {
        if report.is_overfull() {
            log::warn!(
                "EM100 sent too much data: {} records, decoding {}",
                report.declared_count(),
                report.record_count()
            );
            events.push(BusEvent::ReportClamped {
                declared: report.declared_count(),
            });
        }
        for record in report.records() {
            self.decode_record(record, events)?;
        }
        Ok(())
    }
}

/// Decode a batch of reports in order
///
/// State is not rolled back if decoding fails part way; the next batch
/// picks up from wherever this one stopped.
pub fn decode_batch(reports: &[TraceReport], state: &mut DecoderState) -> Result<Vec<BusEvent>> {
    let mut events = Vec::new();
    for report in reports {
        state.decode_report(report, &mut events)?;
    }
    Ok(events)
}
