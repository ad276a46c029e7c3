//! SPI flash opcodes seen on the emulated bus
//!
//! Only the subset the appliance reports in its trace is listed here.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable
pub const WREN: u8 = 0x06;
/// Write Disable
pub const WRDI: u8 = 0x04;

// ============================================================================
// Status register operations
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;
/// Write Status Register 1
pub const WRSR: u8 = 0x01;

// ============================================================================
// Identification
// ============================================================================

/// Read JEDEC ID
pub const RDID: u8 = 0x9F;
/// Read SFDP table
pub const RDSFDP: u8 = 0x5A;

// ============================================================================
// Read commands - 3-byte address
// ============================================================================

/// Read Data
pub const READ: u8 = 0x03;
/// Fast Read (one dummy byte)
pub const FAST_READ: u8 = 0x0B;
/// Dual Output Read (two dummy bytes as seen on the trace)
pub const DOR: u8 = 0x3B;
/// Dual I/O Read
pub const DIOR: u8 = 0xBB;

// ============================================================================
// Program commands
// ============================================================================

/// Page Program
pub const PP: u8 = 0x02;

// ============================================================================
// Erase commands
// ============================================================================

/// Sector Erase 4 KiB
pub const SE_20: u8 = 0x20;
/// Block Erase 32 KiB
pub const BE_52: u8 = 0x52;
/// Block Erase 64 KiB
pub const BE_D8: u8 = 0xD8;
/// Chip Erase
pub const CE_60: u8 = 0x60;
/// Chip Erase (alternate opcode)
pub const CE_C7: u8 = 0xC7;

// ============================================================================
// Appliance specific
// ============================================================================

/// Opcode the appliance claims for its hyper terminal channel
pub const EM100_SPECIFIC: u8 = 0x11;
