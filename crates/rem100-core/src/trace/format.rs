//! Text rendering of decoded bus events

use core::fmt::{self, Write};

use super::decoder::BusEvent;

/// Ticks per second of the device's timestamp counter
pub const TICKS_PER_SECOND: u64 = 100_000_000;

const LINE_LENGTH: usize = 16;

/// Renders [`BusEvent`]s as the classic hex trace
///
/// ```text
/// Time: 000000.00001234 command # 3      : 0x03 - read
/// 00123450 : de ad be ef ...
/// ```
#[derive(Debug, Clone, Default)]
pub struct TraceFormatter {
    addr_offset: u64,
    out_bytes: usize,
}

impl TraceFormatter {
    /// Create a formatter adding `addr_offset` to every printed address
    pub fn new(addr_offset: u64) -> Self {
        Self {
            addr_offset,
            out_bytes: 0,
        }
    }

    /// Write the text for one event
    pub fn write_event<W: Write>(&mut self, out: &mut W, event: &BusEvent) -> fmt::Result {
        match event {
            BusEvent::CommandStart {
                sequence,
                elapsed,
                opcode,
                descriptor,
                ..
            } => {
                self.out_bytes = 0;
                write!(
                    out,
                    "\nTime: {:06}.{:08} command # {:<6} : 0x{:02x} - {}",
                    elapsed / TICKS_PER_SECOND,
                    elapsed % TICKS_PER_SECOND,
                    sequence,
                    opcode,
                    descriptor.name
                )
            }
            BusEvent::Data { address, byte } => {
                if self.out_bytes == 0 {
                    match address {
                        Some(a) => {
                            let shown = self.addr_offset.wrapping_add(*a as u64);
                            write!(out, "\n{:08x} : ", shown)?
                        }
                        None => out.write_str("\n         : ")?,
                    }
                }
                self.out_bytes = (self.out_bytes + 1) % LINE_LENGTH;
                write!(out, "{:02x} ", byte)
            }
            BusEvent::ReportClamped { declared } => {
                write!(out, "\nWarning: EM100pro sends too much data ({declared} records).")
            }
            BusEvent::Timestamp(_) | BusEvent::WriteComplete(_) => Ok(()),
        }
    }

    /// Render a sequence of events into a string
    pub fn render(&mut self, events: &[BusEvent]) -> alloc::string::String {
        let mut out = alloc::string::String::new();
        for event in events {
            // Writing into a String cannot fail
            let _ = self.write_event(&mut out, event);
        }
        out
    }
}
