//! EM100 command protocol
//!
//! Every request is a 16-byte frame sent to the bulk OUT endpoint, with
//! the opcode in byte 0 and big-endian fields after it. Responses come back
//! on the bulk IN endpoint; most start with a length byte.

use core::fmt;

/// Size of a command frame
pub const COMMAND_LENGTH: usize = 16;

/// A raw command frame
pub type CommandFrame = [u8; COMMAND_LENGTH];

/// SDRAM transfers are split into chunks of this size
pub const SDRAM_CHUNK_SIZE: usize = 0x20_0000;

/// Size of an SPI flash page read
pub const SPI_PAGE_SIZE: usize = 256;

/// Page of the appliance's own flash holding the serial number
pub const SERIAL_NUMBER_PAGE: u32 = 0x1f_ff00;

/// Trace configuration: follow the emulation state
pub const TRACE_CONFIG: u8 = 0x15;

/// Opcodes
pub mod opcode {
    /// Read MCU and FPGA versions
    pub const GET_VERSION: u8 = 0x10;
    /// Read an FPGA register
    pub const READ_FPGA_REGISTER: u8 = 0x22;
    /// Write an FPGA register
    pub const WRITE_FPGA_REGISTER: u8 = 0x23;
    /// Read a page of the appliance's own SPI flash
    pub const READ_SPI_FLASH_PAGE: u8 = 0x33;
    /// Host to SDRAM transfer
    pub const WRITE_SDRAM: u8 = 0x40;
    /// SDRAM to host transfer
    pub const READ_SDRAM: u8 = 0x41;
    /// Read a hyper terminal register
    pub const READ_HT_REGISTER: u8 = 0x50;
    /// Write a hyper terminal register
    pub const WRITE_HT_REGISTER: u8 = 0x51;
    /// Read the uFIFO
    pub const READ_UFIFO: u8 = 0x53;
    /// Read trace reports
    pub const READ_TRACE: u8 = 0xbc;
    /// Clear the trace buffer
    pub const RESET_TRACE: u8 = 0xbd;
}

/// FPGA registers
pub mod fpga_register {
    /// Emulation run/stop
    pub const STATE: u8 = 0x28;
    /// Hold pin configuration
    pub const HOLD_PIN: u8 = 0x2a;
    /// Opcode reserved for the hyper terminal
    pub const HT_OPCODE: u8 = 0x82;
}

/// Bit the host sets in the hold pin register to acknowledge it
pub const HOLD_PIN_ACK: u16 = 1 << 2;

/// A request to the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read firmware versions
    GetVersion,
    /// Read a 16-bit FPGA register
    ReadFpgaRegister {
        /// Register number
        reg: u8,
    },
    /// Write a 16-bit FPGA register
    WriteFpgaRegister {
        /// Register number
        reg: u8,
        /// New value
        value: u16,
    },
    /// Read a 256-byte page from the appliance's flash
    ReadSpiFlashPage {
        /// 24-bit page address
        address: u32,
    },
    /// Start a host to SDRAM transfer
    WriteSdram {
        /// First byte
        address: u32,
        /// Total length
        length: u32,
    },
    /// Start an SDRAM to host transfer
    ReadSdram {
        /// First byte
        address: u32,
        /// Total length
        length: u32,
    },
    /// Read a hyper terminal register
    ReadHtRegister {
        /// Register number
        reg: u8,
    },
    /// Write a hyper terminal register
    WriteHtRegister {
        /// Register number
        reg: u8,
        /// New value
        value: u8,
    },
    /// Read the uFIFO
    ReadUfifo {
        /// Bytes requested
        length: u16,
        /// Timeout in ms
        timeout: u16,
    },
    /// Read trace reports
    ReadTrace {
        /// Number of 8192-byte reports
        reports: u32,
        /// Trace configuration byte
        config: u8,
    },
    /// Clear the trace buffer
    ResetTrace,
}

impl Command {
    /// Encode into a frame
    pub fn encode(&self) -> CommandFrame {
        let mut f = [0u8; COMMAND_LENGTH];
        match *self {
            Command::GetVersion => f[0] = opcode::GET_VERSION,
            Command::ReadFpgaRegister { reg } => {
                f[0] = opcode::READ_FPGA_REGISTER;
                f[1] = reg;
            }
            Command::WriteFpgaRegister { reg, value } => {
                f[0] = opcode::WRITE_FPGA_REGISTER;
                f[1] = reg;
                f[2..4].copy_from_slice(&value.to_be_bytes());
            }
            Command::ReadSpiFlashPage { address } => {
                f[0] = opcode::READ_SPI_FLASH_PAGE;
                f[1..4].copy_from_slice(&address.to_be_bytes()[1..]);
            }
            Command::WriteSdram { address, length } => {
                f[0] = opcode::WRITE_SDRAM;
                f[1..5].copy_from_slice(&address.to_be_bytes());
                f[5..9].copy_from_slice(&length.to_be_bytes());
            }
            Command::ReadSdram { address, length } => {
                f[0] = opcode::READ_SDRAM;
                f[1..5].copy_from_slice(&address.to_be_bytes());
                f[5..9].copy_from_slice(&length.to_be_bytes());
            }
            Command::ReadHtRegister { reg } => {
                f[0] = opcode::READ_HT_REGISTER;
                f[1] = reg;
            }
            Command::WriteHtRegister { reg, value } => {
                f[0] = opcode::WRITE_HT_REGISTER;
                f[1] = reg;
                f[2] = value;
            }
            Command::ReadUfifo { length, timeout } => {
                f[0] = opcode::READ_UFIFO;
                f[1..3].copy_from_slice(&length.to_be_bytes());
                f[3..5].copy_from_slice(&timeout.to_be_bytes());
            }
            Command::ReadTrace { reports, config } => {
                f[0] = opcode::READ_TRACE;
                f[1..5].copy_from_slice(&reports.to_be_bytes());
                // bytes 5..9: timeout, always zero
                f[9] = config;
            }
            Command::ResetTrace => f[0] = opcode::RESET_TRACE,
        }
        f
    }

    /// Decode a frame, `None` for unknown opcodes
    pub fn decode(f: &CommandFrame) -> Option<Self> {
        let be16 = |i: usize| u16::from_be_bytes([f[i], f[i + 1]]);
        let be32 = |i: usize| u32::from_be_bytes([f[i], f[i + 1], f[i + 2], f[i + 3]]);

        let cmd = match f[0] {
            opcode::GET_VERSION => Command::GetVersion,
            opcode::READ_FPGA_REGISTER => Command::ReadFpgaRegister { reg: f[1] },
            opcode::WRITE_FPGA_REGISTER => Command::WriteFpgaRegister {
                reg: f[1],
                value: be16(2),
            },
            opcode::READ_SPI_FLASH_PAGE => Command::ReadSpiFlashPage {
                address: u32::from_be_bytes([0, f[1], f[2], f[3]]),
            },
            opcode::WRITE_SDRAM => Command::WriteSdram {
                address: be32(1),
                length: be32(5),
            },
            opcode::READ_SDRAM => Command::ReadSdram {
                address: be32(1),
                length: be32(5),
            },
            opcode::READ_HT_REGISTER => Command::ReadHtRegister { reg: f[1] },
            opcode::WRITE_HT_REGISTER => Command::WriteHtRegister {
                reg: f[1],
                value: f[2],
            },
            opcode::READ_UFIFO => Command::ReadUfifo {
                length: be16(1),
                timeout: be16(3),
            },
            opcode::READ_TRACE => Command::ReadTrace {
                reports: be32(1),
                config: f[9],
            },
            opcode::RESET_TRACE => Command::ResetTrace,
            _ => return None,
        };
        Some(cmd)
    }
}

/// MCU and FPGA firmware versions, each major in the high byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Microcontroller firmware
    pub mcu: u16,
    /// FPGA bitstream; bit 15 flags the 1.8V variant
    pub fpga: u16,
}

impl Version {
    /// Parse the 5-byte version response
    pub fn from_response(data: &[u8]) -> Option<Self> {
        match data {
            [4, f0, f1, m0, m1] => Some(Self {
                fpga: u16::from_be_bytes([*f0, *f1]),
                mcu: u16::from_be_bytes([*m0, *m1]),
            }),
            _ => None,
        }
    }

    /// Whether the FPGA reports a voltage (firmware newer than 0.51)
    pub fn fpga_reports_voltage(&self) -> bool {
        self.fpga > 0x0033
    }

    /// Whether the FPGA drives 1.8V chips
    pub fn is_1v8(&self) -> bool {
        self.fpga & 0x8000 != 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MCU version: {}.{:02}", self.mcu >> 8, self.mcu & 0xff)?;
        if self.fpga_reports_voltage() {
            write!(
                f,
                "FPGA version: {}.{:02} ({})",
                (self.fpga >> 8) & 0x7f,
                self.fpga & 0xff,
                if self.is_1v8() { "1.8V" } else { "3.3V" }
            )
        } else {
            write!(f, "FPGA version: {}.{:02}", self.fpga >> 8, self.fpga & 0xff)
        }
    }
}

/// Configuration of the emulated chip's HOLD pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPinState {
    /// Driven low
    Low,
    /// Left floating
    Float,
    /// Used as input
    Input,
}

impl HoldPinState {
    /// Register encoding
    pub fn value(self) -> u16 {
        match self {
            HoldPinState::Low => 0,
            HoldPinState::Float => 2,
            HoldPinState::Input => 3,
        }
    }

    /// Decode a register value
    pub fn from_value(value: u16) -> Option<Self> {
        match value {
            0 => Some(HoldPinState::Low),
            2 => Some(HoldPinState::Float),
            3 => Some(HoldPinState::Input),
            _ => None,
        }
    }

    /// Parse a user supplied name, case insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        [HoldPinState::Low, HoldPinState::Float, HoldPinState::Input]
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Lower case name
    pub fn name(self) -> &'static str {
        match self {
            HoldPinState::Low => "low",
            HoldPinState::Float => "float",
            HoldPinState::Input => "input",
        }
    }
}

impl fmt::Display for HoldPinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Format a serial number the way it is printed on the appliance
pub struct SerialNumber(pub u32);

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DP{:06}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_frame() {
        let frame = Command::ReadTrace {
            reports: 8,
            config: TRACE_CONFIG,
        }
        .encode();
        assert_eq!(
            frame,
            [0xbc, 0, 0, 0, 0x08, 0, 0, 0, 0, 0x15, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_sdram_frame() {
        let frame = Command::WriteSdram {
            address: 0x00aa_0000,
            length: 4,
        }
        .encode();
        assert_eq!(&frame[..9], &[0x40, 0x00, 0xaa, 0x00, 0x00, 0, 0, 0, 4]);
        assert_eq!(
            Command::decode(&frame),
            Some(Command::WriteSdram {
                address: 0x00aa_0000,
                length: 4
            })
        );
    }

    #[test]
    fn test_unknown_frame() {
        let mut frame = [0u8; COMMAND_LENGTH];
        frame[0] = 0x99;
        assert_eq!(Command::decode(&frame), None);
    }

    #[test]
    fn test_version() {
        let v = Version::from_response(&[4, 0x80, 0x4b, 0x02, 0x05]).unwrap();
        assert_eq!(v.mcu, 0x0205);
        assert!(v.is_1v8());
        assert_eq!(
            alloc::format!("{v}"),
            "MCU version: 2.05\nFPGA version: 0.75 (1.8V)"
        );
        assert_eq!(Version::from_response(&[3, 0, 0, 0]), None);
    }

    #[test]
    fn test_hold_pin_names() {
        assert_eq!(HoldPinState::from_name("FLOAT"), Some(HoldPinState::Float));
        assert_eq!(HoldPinState::from_name("bogus"), None);
        assert_eq!(HoldPinState::from_value(3), Some(HoldPinState::Input));
        assert_eq!(HoldPinState::from_value(1), None);
    }

    #[test]
    fn test_serial_format() {
        assert_eq!(alloc::format!("{}", SerialNumber(1234)), "DP001234");
    }
}
