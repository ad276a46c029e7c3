//! SPI command classification
//!
//! The trace only carries raw bus bytes. To split a command into opcode,
//! address, dummy bytes and payload the decoder needs to know the shape of
//! each opcode, which is what this table provides.

use super::opcodes;

/// Static description of one SPI command as seen on the trace
#[derive(Debug, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Human readable name
    pub name: &'static str,
    /// Opcode byte
    pub opcode: u8,
    /// Whether a 3-byte address follows the opcode
    pub uses_address: bool,
    /// Dummy bytes between address and payload (0..=2)
    pub pad_bytes: u8,
}

impl CommandDescriptor {
    const fn new(name: &'static str, opcode: u8, uses_address: bool, pad_bytes: u8) -> Self {
        Self {
            name,
            opcode,
            uses_address,
            pad_bytes,
        }
    }

    /// Whether this command writes data into the flash array
    pub fn is_page_program(&self) -> bool {
        self.opcode == opcodes::PP
    }

    /// Whether this is the fallback descriptor for unrecognised opcodes
    pub fn is_unknown(&self) -> bool {
        core::ptr::eq(self, &UNKNOWN_COMMAND)
    }
}

/// Fallback for opcodes not in [`COMMANDS`]
pub static UNKNOWN_COMMAND: CommandDescriptor =
    CommandDescriptor::new("unknown command", 0xff, false, 0);

/// Known commands, keyed by opcode
pub static COMMANDS: [CommandDescriptor; 17] = [
    CommandDescriptor::new("write status register", opcodes::WRSR, false, 0),
    CommandDescriptor::new("page program", opcodes::PP, true, 0),
    CommandDescriptor::new("read", opcodes::READ, true, 0),
    CommandDescriptor::new("write disable", opcodes::WRDI, false, 0),
    CommandDescriptor::new("read status register", opcodes::RDSR, false, 0),
    CommandDescriptor::new("write enable", opcodes::WREN, false, 0),
    CommandDescriptor::new("fast read", opcodes::FAST_READ, true, 1),
    CommandDescriptor::new("EM100 specific", opcodes::EM100_SPECIFIC, false, 0),
    CommandDescriptor::new("fast dual read", opcodes::DOR, true, 2),
    CommandDescriptor::new("dual I/O read", opcodes::DIOR, true, 2),
    CommandDescriptor::new("read SFDP", opcodes::RDSFDP, true, 0),
    CommandDescriptor::new("chip erase", opcodes::CE_60, false, 0),
    CommandDescriptor::new("read JEDEC ID", opcodes::RDID, false, 0),
    CommandDescriptor::new("chip erase", opcodes::CE_C7, false, 0),
    CommandDescriptor::new("sector erase", opcodes::SE_20, true, 0),
    CommandDescriptor::new("block erase 32KB", opcodes::BE_52, true, 0),
    CommandDescriptor::new("sector erase", opcodes::BE_D8, true, 0),
];

/// Look up an opcode by scanning the table
///
/// Total: unrecognised opcodes map to [`UNKNOWN_COMMAND`].
pub fn lookup(opcode: u8) -> &'static CommandDescriptor {
    COMMANDS
        .iter()
        .find(|c| c.opcode == opcode)
        .unwrap_or(&UNKNOWN_COMMAND)
}

/// Opcode classifier with a one-entry cache
///
/// Bus traffic is dominated by long runs of the same read command, so the
/// last match is remembered and returned without scanning the table.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    last: &'static CommandDescriptor,
}

impl Default for Classifier {
    fn default() -> Self {
        Self { last: &COMMANDS[2] }
    }
}

impl Classifier {
    /// Create a classifier primed with the plain read command
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify an opcode
    pub fn classify(&mut self, opcode: u8) -> &'static CommandDescriptor {
        // The fallback's 0xff is not a real key, 0xff must always rescan.
        if self.last.opcode != opcode || self.last.is_unknown() {
            self.last = lookup(opcode);
        }
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_opcodes() {
        let pp = lookup(0x02);
        assert_eq!(pp.name, "page program");
        assert!(pp.uses_address);
        assert!(pp.is_page_program());

        let fast = lookup(0x0b);
        assert!(fast.uses_address);
        assert_eq!(fast.pad_bytes, 1);

        let rdid = lookup(0x9f);
        assert!(!rdid.uses_address);
    }

    #[test]
    fn test_unknown_opcode() {
        let desc = lookup(0x42);
        assert!(desc.is_unknown());
        assert!(!desc.uses_address);
        assert_eq!(desc.pad_bytes, 0);
        assert!(!desc.is_page_program());

        // 0xff is the fallback's own opcode but is not a table key
        assert!(lookup(0xff).is_unknown());
    }

    #[test]
    fn test_pad_bytes_in_range() {
        for c in COMMANDS.iter() {
            assert!(c.pad_bytes <= 2, "{} has {} pad bytes", c.name, c.pad_bytes);
        }
    }

    #[test]
    fn test_cache_is_invisible() {
        let mut classifier = Classifier::new();
        let sequence = [0x03, 0x03, 0x02, 0x42, 0x42, 0xff, 0x0b, 0x03, 0x9f, 0x9f, 0x00];
        for &op in &sequence {
            assert!(core::ptr::eq(classifier.classify(op), lookup(op)));
        }
        for op in 0..=255u8 {
            assert!(core::ptr::eq(classifier.classify(op), lookup(op)));
        }
    }
}
