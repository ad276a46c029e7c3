//! SPI hyper terminal
//!
//! Firmware on the bus master can push short messages to the host by
//! sending the appliance-specific opcode. They are collected in the
//! device's uFIFO, which is read back as one 512-byte block: a big-endian
//! valid length followed by packed messages.

use alloc::vec::Vec;
use core::fmt::{self, Write};

use bitflags::bitflags;

/// Size of the uFIFO block read from the device
pub const UFIFO_SIZE: usize = 512;
/// Marks the start of every message
pub const MESSAGE_SIGNATURE: u32 = 0x4736_4440;

const LENGTH_PREFIX: usize = 2;
const HEADER_LENGTH: usize = 6;

/// Hyper terminal registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HtRegister {
    /// Overflow, emulation and FIFO state bits
    Status = 0,
    /// Valid bytes in the dFIFO
    DfifoBytes = 1,
    /// Valid bytes in the uFIFO
    UfifoBytes = 2,
    /// Identification of the appliance on the SPI bus
    Em100Id = 3,
    /// uFIFO data format
    UfifoDataFormat = 4,
    /// Timestamp
    Timestamp = 5,
}

bitflags! {
    /// Bits of the hyper terminal status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HtStatus: u8 {
        /// The uFIFO overflowed
        const UFIFO_OVERFLOW = 1 << 0;
        /// uFIFO byte count is 8-bit
        const BIT8_UFIFO_BYTES = 1 << 3;
        /// SPI emulation runs
        const START_SPI_EMULATION = 1 << 4;
        /// uFIFO holds no data
        const UFIFO_EMPTY = 1 << 5;
        /// dFIFO holds no data
        const DFIFO_EMPTY = 1 << 6;
    }
}

/// How a message's payload should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// One-byte checkpoint
    Checkpoint1,
    /// Two-byte checkpoint
    Checkpoint2,
    /// Four-byte checkpoint
    Checkpoint4,
    /// Hex dump
    Hex,
    /// Text
    Ascii,
    /// Timestamp
    Timestamp,
    /// Index into a host side lookup table (not supported)
    LookupTable,
    /// Anything else
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => MessageType::Checkpoint1,
            0x02 => MessageType::Checkpoint2,
            0x03 => MessageType::Checkpoint4,
            0x04 => MessageType::Hex,
            0x05 => MessageType::Ascii,
            0x06 => MessageType::Timestamp,
            0x07 => MessageType::LookupTable,
            other => MessageType::Unknown(other),
        }
    }
}

/// One message pulled out of the uFIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtMessage<'a> {
    /// Payload format
    pub kind: MessageType,
    /// Payload, truncated to what was actually transferred
    pub data: &'a [u8],
}

impl fmt::Display for HtMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MessageType::Checkpoint1
            | MessageType::Checkpoint2
            | MessageType::Checkpoint4
            | MessageType::Hex
            | MessageType::Timestamp => {
                for b in self.data {
                    write!(f, "{:02x} ", b)?;
                }
            }
            MessageType::Ascii => {
                for &b in self.data {
                    f.write_char(b as char)?;
                }
            }
            MessageType::LookupTable => {
                for pair in self.data.chunks(2) {
                    write!(f, "Lookup unsupported: ")?;
                    for b in pair {
                        write!(f, "{:02x}", b)?;
                    }
                }
            }
            MessageType::Unknown(_) => {}
        }
        Ok(())
    }
}

/// Split a uFIFO block into messages
///
/// Bytes between messages are skipped until a signature is found. Nothing
/// past the declared valid length or the end of the block is read.
pub fn parse_ufifo(block: &[u8]) -> Vec<HtMessage<'_>> {
    let mut messages = Vec::new();
    if block.len() < LENGTH_PREFIX {
        return messages;
    }

    let declared = u16::from_be_bytes([block[0], block[1]]) as usize;
    let body = &block[LENGTH_PREFIX..];
    let valid = declared.min(body.len());

    let mut j = 0;
    while j < valid && j + HEADER_LENGTH <= body.len() {
        let header = &body[j..j + HEADER_LENGTH];
        let signature = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if signature != MESSAGE_SIGNATURE {
            j += 1;
            continue;
        }

        let length = header[5] as usize;
        let start = j + HEADER_LENGTH;
        let end = (start + length).min(valid);
        messages.push(HtMessage {
            kind: MessageType::from(header[4]),
            data: body.get(start..end).unwrap_or(&[]),
        });
        j = start + length;
    }
    messages
}

/// Prints hyper terminal messages with a running counter
#[derive(Debug, Clone)]
pub struct TerminalPrinter {
    counter: u32,
}

impl Default for TerminalPrinter {
    fn default() -> Self {
        Self { counter: 1 }
    }
}

impl TerminalPrinter {
    /// Start counting at 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Write messages, each prefixed by its number when `show_counter` is set
    pub fn write_messages<W: Write>(
        &mut self,
        out: &mut W,
        messages: &[HtMessage<'_>],
        show_counter: bool,
    ) -> fmt::Result {
        for message in messages {
            if show_counter {
                write!(out, "\nHT{:06}: ", self.counter)?;
            }
            write!(out, "{}", message)?;
            self.counter = self.counter.wrapping_add(1);
        }
        Ok(())
    }
}

/// Build a uFIFO block holding the given messages
///
/// Used by the software emulator.
pub fn build_ufifo(messages: &[(u8, &[u8])]) -> Vec<u8> {
    let mut block = alloc::vec![0u8; UFIFO_SIZE];
    let mut pos = LENGTH_PREFIX;
    for (kind, data) in messages {
        let needed = HEADER_LENGTH + data.len();
        if pos + needed > UFIFO_SIZE {
            break;
        }
        block[pos..pos + 4].copy_from_slice(&MESSAGE_SIGNATURE.to_le_bytes());
        block[pos + 4] = *kind;
        block[pos + 5] = data.len() as u8;
        block[pos + HEADER_LENGTH..pos + needed].copy_from_slice(data);
        pos += needed;
    }
    let valid = (pos - LENGTH_PREFIX) as u16;
    block[..LENGTH_PREFIX].copy_from_slice(&valid.to_be_bytes());
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn test_empty_block() {
        assert!(parse_ufifo(&[0u8; UFIFO_SIZE]).is_empty());
        assert!(parse_ufifo(&[]).is_empty());
    }

    #[test]
    fn test_messages() {
        let block = build_ufifo(&[(0x05, b"boot ok"), (0x01, &[0x42]), (0x04, &[1, 2, 3])]);
        let messages = parse_ufifo(&block);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].kind, MessageType::Ascii);
        assert_eq!(messages[0].data, b"boot ok");
        assert_eq!(messages[1].kind, MessageType::Checkpoint1);
        assert_eq!(messages[2].data, &[1, 2, 3]);

        let mut out = String::new();
        TerminalPrinter::new()
            .write_messages(&mut out, &messages, true)
            .unwrap();
        assert_eq!(
            out,
            "\nHT000001: boot ok\nHT000002: 42 \nHT000003: 01 02 03 "
        );
    }

    #[test]
    fn test_garbage_between_messages() {
        let mut block = build_ufifo(&[(0x05, b"a")]);
        // Shift the message right by three junk bytes
        let valid = u16::from_be_bytes([block[0], block[1]]) + 3;
        let msg: Vec<u8> = block[2..9].to_vec();
        block[2..5].copy_from_slice(&[0xde, 0xad, 0x00]);
        block[5..12].copy_from_slice(&msg);
        block[..2].copy_from_slice(&valid.to_be_bytes());

        let messages = parse_ufifo(&block);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, b"a");
    }

    #[test]
    fn test_truncated_to_valid_length() {
        let mut block = build_ufifo(&[(0x04, &[9, 8, 7, 6])]);
        // Claim only two payload bytes were transferred
        block[..2].copy_from_slice(&(HEADER_LENGTH as u16 + 2).to_be_bytes());
        let messages = parse_ufifo(&block);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, &[9, 8]);
    }

    #[test]
    fn test_bogus_length_stays_in_bounds() {
        let mut block = alloc::vec![0u8; UFIFO_SIZE];
        block[..2].copy_from_slice(&0xffffu16.to_be_bytes());
        let tail = UFIFO_SIZE - LENGTH_PREFIX - HEADER_LENGTH;
        block[2 + tail..2 + tail + 4].copy_from_slice(&MESSAGE_SIGNATURE.to_le_bytes());
        block[2 + tail + 4] = 0x04;
        block[2 + tail + 5] = 0xff;

        let messages = parse_ufifo(&block);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].data.is_empty());
    }

    #[test]
    fn test_lookup_table_rendering() {
        let msg = HtMessage {
            kind: MessageType::LookupTable,
            data: &[0x12, 0x34],
        };
        assert_eq!(alloc::format!("{msg}"), "Lookup unsupported: 1234");
    }
}
