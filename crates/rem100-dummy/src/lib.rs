//! rem100-dummy - In-memory EM100 emulator for testing
//!
//! This crate provides a software stand-in for the appliance. It answers
//! the command protocol from memory: SDRAM contents, FPGA and hyper
//! terminal registers, and scripted trace reports and uFIFO blocks. Every
//! decoded command is logged so tests can check what was sent.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use rem100_core::device::protocol::{
    fpga_register, Command, CommandFrame, SDRAM_CHUNK_SIZE, SERIAL_NUMBER_PAGE, SPI_PAGE_SIZE,
};
use rem100_core::device::CommandTransport;
use rem100_core::error::{Error, Result};
use rem100_core::terminal::UFIFO_SIZE;
use rem100_core::trace::report::REPORT_BUFFER_LENGTH;

const UFIFO_TRAILER: [u8; 2] = [0, 0];

/// Configuration for the dummy appliance
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// SDRAM size in bytes
    pub sdram_size: usize,
    /// MCU firmware version
    pub mcu_version: u16,
    /// FPGA version
    pub fpga_version: u16,
    /// Serial number, `None` for an unprogrammed appliance
    pub serial: Option<u32>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            sdram_size: 16 * 1024 * 1024,
            mcu_version: 0x0302,
            fpga_version: 0x004b,
            serial: Some(0),
        }
    }
}

/// An SDRAM transfer announced by a command and fed by `write_data`
#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    address: usize,
    remaining: usize,
}

/// Dummy appliance
///
/// Emulates an EM100Pro in memory for testing purposes.
pub struct DummyEm100 {
    config: DummyConfig,
    sdram: Vec<u8>,
    fpga_registers: [u16; 256],
    ht_registers: [u8; 8],
    trace_reports: VecDeque<Vec<u8>>,
    ufifo_blocks: VecDeque<Vec<u8>>,
    responses: VecDeque<Vec<u8>>,
    pending_write: Option<PendingWrite>,
    commands: Vec<Command>,
}

impl DummyEm100 {
    /// Create a dummy appliance with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let sdram = vec![0xff; config.sdram_size];
        Self {
            config,
            sdram,
            fpga_registers: [0; 256],
            ht_registers: [0; 8],
            trace_reports: VecDeque::new(),
            ufifo_blocks: VecDeque::new(),
            responses: VecDeque::new(),
            pending_write: None,
            commands: Vec::new(),
        }
    }

    /// Create a dummy appliance with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// SDRAM contents
    pub fn sdram(&self) -> &[u8] {
        &self.sdram
    }

    /// Current value of an FPGA register
    pub fn fpga_register(&self, reg: u8) -> u16 {
        self.fpga_registers[reg as usize]
    }

    /// Current value of a hyper terminal register
    pub fn ht_register(&self, reg: u8) -> u8 {
        self.ht_registers.get(reg as usize).copied().unwrap_or(0)
    }

    /// Whether emulation is running
    pub fn is_running(&self) -> bool {
        self.fpga_register(fpga_register::STATE) & 1 != 0
    }

    /// Queue a trace report for the next trace read
    ///
    /// Reads beyond the scripted reports return empty reports.
    pub fn push_trace_report(&mut self, report: Vec<u8>) {
        self.trace_reports.push_back(report);
    }

    /// Queue a uFIFO block for the next uFIFO read
    pub fn push_ufifo_block(&mut self, block: Vec<u8>) {
        self.ufifo_blocks.push_back(block);
    }

    /// Every command received so far
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn respond(&mut self, data: Vec<u8>) {
        self.responses.push_back(data);
    }

    fn sdram_range(&self, address: u32, length: u32) -> (usize, usize) {
        let start = (address as usize).min(self.sdram.len());
        let end = start.saturating_add(length as usize).min(self.sdram.len());
        (start, end)
    }

    fn serial_page(&self) -> Vec<u8> {
        let mut page = vec![0xff; SPI_PAGE_SIZE];
        let serial = self.config.serial.unwrap_or(u32::MAX);
        page[2..6].copy_from_slice(&serial.to_le_bytes());
        page
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::GetVersion => {
                let fpga = self.config.fpga_version.to_be_bytes();
                let mcu = self.config.mcu_version.to_be_bytes();
                self.respond(vec![4, fpga[0], fpga[1], mcu[0], mcu[1]]);
            }
            Command::ReadFpgaRegister { reg } => {
                let value = self.fpga_register(reg).to_be_bytes();
                self.respond(vec![2, value[0], value[1]]);
            }
            Command::WriteFpgaRegister { reg, value } => {
                self.fpga_registers[reg as usize] = value;
            }
            Command::ReadSpiFlashPage { address } => {
                let page = if address == SERIAL_NUMBER_PAGE {
                    self.serial_page()
                } else {
                    vec![0xff; SPI_PAGE_SIZE]
                };
                self.respond(page);
            }
            Command::WriteSdram { address, length } => {
                let (start, end) = self.sdram_range(address, length);
                self.pending_write = Some(PendingWrite {
                    address: start,
                    remaining: end - start,
                });
            }
            Command::ReadSdram { address, length } => {
                let (start, end) = self.sdram_range(address, length);
                let data = self.sdram[start..end].to_vec();
                if data.is_empty() {
                    self.respond(Vec::new());
                }
                for chunk in data.chunks(SDRAM_CHUNK_SIZE) {
                    self.respond(chunk.to_vec());
                }
            }
            Command::ReadHtRegister { reg } => {
                let value = self.ht_register(reg);
                self.respond(vec![1, value]);
            }
            Command::WriteHtRegister { reg, value } => {
                if let Some(r) = self.ht_registers.get_mut(reg as usize) {
                    *r = value;
                }
            }
            Command::ReadUfifo { length, .. } => {
                let mut block = self
                    .ufifo_blocks
                    .pop_front()
                    .unwrap_or_else(|| vec![0; UFIFO_SIZE]);
                block.truncate(length as usize);
                self.respond(block);
                self.respond(UFIFO_TRAILER.to_vec());
            }
            Command::ReadTrace { reports, .. } => {
                for _ in 0..reports {
                    let report = self
                        .trace_reports
                        .pop_front()
                        .unwrap_or_else(|| vec![0; REPORT_BUFFER_LENGTH]);
                    self.respond(report);
                }
            }
            Command::ResetTrace => {}
        }
        self.commands.push(command);
    }
}

impl CommandTransport for DummyEm100 {
    fn send_command(&mut self, frame: &CommandFrame) -> Result<()> {
        match Command::decode(frame) {
            Some(command) => {
                log::trace!("dummy: {:?}", command);
                self.handle(command);
                Ok(())
            }
            None => {
                log::warn!("dummy: unknown command {:#04x}", frame[0]);
                Err(Error::InvalidArgument)
            }
        }
    }

    fn read_response(&mut self, buf: &mut [u8]) -> Result<usize> {
        let data = self.responses.pop_front().ok_or(Error::Timeout)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write_data(&mut self, data: &[u8]) -> Result<usize> {
        let pending = self.pending_write.as_mut().ok_or(Error::TransportError)?;
        let len = data.len().min(pending.remaining);
        self.sdram[pending.address..pending.address + len].copy_from_slice(&data[..len]);
        pending.address += len;
        pending.remaining -= len;
        if pending.remaining == 0 {
            self.pending_write = None;
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rem100_core::device::{Emulator, HoldPinState};
    use rem100_core::terminal::{build_ufifo, parse_ufifo};
    use rem100_core::trace::{BusEvent, DecoderState, ReportBuilder};

    fn emulator() -> Emulator<DummyEm100> {
        Emulator::new(DummyEm100::new(DummyConfig {
            sdram_size: 4096,
            serial: Some(4711),
            ..Default::default()
        }))
    }

    #[test]
    fn test_version_and_serial() {
        let mut em = emulator();
        let version = em.get_version().unwrap();
        assert_eq!(version.mcu, 0x0302);
        assert_eq!(em.serial_number().unwrap(), Some(4711));
    }

    #[test]
    fn test_sdram_round_trip() {
        let mut em = emulator();
        em.write_block(0x100, b"hello").unwrap();
        assert_eq!(&em.transport().sdram()[0x100..0x105], b"hello");

        let mut buf = [0u8; 5];
        em.read_block(0x100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_write_past_end_is_short() {
        let mut em = emulator();
        assert_eq!(
            em.write_block(4090, &[0u8; 10]),
            Err(Error::ShortResponse {
                expected: 10,
                actual: 6
            })
        );
    }

    #[test]
    fn test_run_state_and_hold_pin() {
        let mut em = emulator();
        em.set_running(true).unwrap();
        assert!(em.is_running().unwrap());
        em.pause_emulation().unwrap();
        assert!(!em.transport().is_running());

        em.set_hold_pin(HoldPinState::Input).unwrap();
        assert_eq!(em.hold_pin().unwrap(), HoldPinState::Input);
    }

    #[test]
    fn test_scripted_trace() {
        let mut em = emulator();
        em.transport_mut().push_trace_report(
            ReportBuilder::new()
                .command(1, &[0x03, 0x00, 0x00, 0x00, 0xaa])
                .build(),
        );

        let mut state = DecoderState::new();
        let events = em.read_trace(&mut state).unwrap();
        assert!(matches!(events[0], BusEvent::CommandStart { opcode: 0x03, .. }));
        assert_eq!(
            events[1],
            BusEvent::Data {
                address: Some(0),
                byte: 0xaa
            }
        );

        // Nothing scripted: empty reports
        assert!(em.read_trace(&mut state).unwrap().is_empty());
    }

    #[test]
    fn test_scripted_ufifo() {
        let mut em = emulator();
        em.transport_mut()
            .push_ufifo_block(build_ufifo(&[(0x05, b"hi")]));
        let block = em.poll_terminal().unwrap();
        let messages = parse_ufifo(&block);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, b"hi");
    }
}
