//! Signaling regions inside the emulated flash image
//!
//! The bus master and the bridge talk through a handful of reserved words
//! in the image. Their offsets and magic values are fixed by the firmware
//! running on the master and must match exactly.

/// Lock handshake word
pub const LOCK_OFFSET: u32 = 0x00aa_0000;
/// Byte count the master has consumed from the message window
pub const AVAILABLE_COUNT_OFFSET: u32 = 0x00aa_a000;
/// Start of the inbound message window
pub const MESSAGE_WINDOW_OFFSET: u32 = 0x00aa_b000;
/// Size of the inbound message window
pub const MESSAGE_WINDOW_LENGTH: u32 = 0x1000;
/// "Data available" flag word
pub const DATA_AVAILABLE_OFFSET: u32 = 0x00aa_c000;

/// First byte past the signaling region
pub const SIGNALING_END: u32 = DATA_AVAILABLE_OFFSET + 4;

/// Size of every control word
pub const CONTROL_WORD_LENGTH: usize = 4;

/// Magic values written to the control words (little-endian on the wire)
pub mod magic {
    /// Written to the data-available word when the peer sent something
    pub const AVAILABLE: u32 = 0x1964_0522;
    /// Master asks to give the flash back
    pub const UNLOCK_REQUEST: u32 = 0x1957_0528;
    /// Bridge acknowledges an unlock
    pub const UNLOCKED: u32 = 0x1828_0208;
    /// Master asks for exclusive access
    pub const LOCK_REQUEST: u32 = 0x1938_0110;
    /// Bridge acknowledges a lock
    pub const LOCKED: u32 = 0x1899_0223;
}

/// Where a write lands in the memory map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// The lock handshake word
    LockWord,
    /// The consumed-byte acknowledgement word
    AvailableCount,
    /// Somewhere inside the 4 KiB message window
    MessageWindow,
    /// The data-available flag word
    DataAvailable,
    /// Regular flash contents
    Flash,
}

impl Region {
    /// Whether writes here are signaling rather than flash data
    pub fn is_signaling(self) -> bool {
        self != Region::Flash
    }
}

/// Classify the start offset of a write
pub fn region_of(offset: u32) -> Region {
    match offset {
        LOCK_OFFSET => Region::LockWord,
        AVAILABLE_COUNT_OFFSET => Region::AvailableCount,
        DATA_AVAILABLE_OFFSET => Region::DataAvailable,
        o if (MESSAGE_WINDOW_OFFSET..MESSAGE_WINDOW_OFFSET + MESSAGE_WINDOW_LENGTH).contains(&o) => {
            Region::MessageWindow
        }
        _ => Region::Flash,
    }
}

/// Read a control word out of a write payload
///
/// Only payloads of exactly four bytes are control words.
pub fn control_word(data: &[u8]) -> Option<u32> {
    let bytes: [u8; CONTROL_WORD_LENGTH] = data.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
