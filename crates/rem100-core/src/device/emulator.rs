//! Register, memory and trace access on top of a [`CommandTransport`]

use alloc::vec;
use alloc::vec::Vec;

use super::protocol::{
    fpga_register, Command, HoldPinState, Version, HOLD_PIN_ACK, SDRAM_CHUNK_SIZE,
    SERIAL_NUMBER_PAGE, SPI_PAGE_SIZE, TRACE_CONFIG,
};
use super::transport::CommandTransport;
use crate::error::{Error, Result};
use crate::spi::opcodes::EM100_SPECIFIC;
use crate::terminal::{HtRegister, HtStatus, UFIFO_SIZE};
use crate::trace::report::{TraceReport, REPORT_BUFFER_COUNT, REPORT_BUFFER_LENGTH};
use crate::trace::{decode_batch, BusEvent, DecoderState};

const VERSION_RESPONSE_CAPACITY: usize = 512;
const UFIFO_TRAILER_LENGTH: usize = 2;

/// An EM100-class appliance
pub struct Emulator<T> {
    transport: T,
}

impl<T: CommandTransport> Emulator<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Borrow the transport mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give the transport back
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send(&mut self, command: Command) -> Result<()> {
        log::trace!("command {:?}", command);
        self.transport.send_command(&command.encode())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let actual = self.transport.read_response(buf)?;
        if actual != buf.len() {
            return Err(Error::ShortResponse {
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // System
    // ------------------------------------------------------------------

    /// Read MCU and FPGA firmware versions
    pub fn get_version(&mut self) -> Result<Version> {
        self.send(Command::GetVersion)?;
        let mut buf = [0u8; VERSION_RESPONSE_CAPACITY];
        let len = self.transport.read_response(&mut buf)?;
        Version::from_response(&buf[..len]).ok_or(Error::InvalidResponse)
    }

    /// Read the serial number, `None` if it was never programmed
    pub fn serial_number(&mut self) -> Result<Option<u32>> {
        let page = self.read_spi_flash_page(SERIAL_NUMBER_PAGE)?;
        let serial = u32::from_le_bytes([page[2], page[3], page[4], page[5]]);
        Ok((serial != u32::MAX).then_some(serial))
    }

    /// Read one 256-byte page of the appliance's own flash
    pub fn read_spi_flash_page(&mut self, address: u32) -> Result<[u8; SPI_PAGE_SIZE]> {
        self.send(Command::ReadSpiFlashPage { address })?;
        let mut page = [0u8; SPI_PAGE_SIZE];
        self.read_exact(&mut page)?;
        Ok(page)
    }

    // ------------------------------------------------------------------
    // FPGA
    // ------------------------------------------------------------------

    /// Read a 16-bit FPGA register
    pub fn read_fpga_register(&mut self, reg: u8) -> Result<u16> {
        self.send(Command::ReadFpgaRegister { reg })?;
        let mut buf = [0u8; 3];
        self.read_exact(&mut buf)?;
        if buf[0] != 2 {
            return Err(Error::InvalidResponse);
        }
        Ok(u16::from_be_bytes([buf[1], buf[2]]))
    }

    /// Write a 16-bit FPGA register
    pub fn write_fpga_register(&mut self, reg: u8, value: u16) -> Result<()> {
        self.send(Command::WriteFpgaRegister { reg, value })
    }

    /// Start or stop emulation
    pub fn set_running(&mut self, run: bool) -> Result<()> {
        self.write_fpga_register(fpga_register::STATE, run as u16)?;
        log::info!("{} EM100Pro", if run { "Started" } else { "Stopped" });
        Ok(())
    }

    /// Whether emulation is running
    pub fn is_running(&mut self) -> Result<bool> {
        Ok(self.read_fpga_register(fpga_register::STATE)? != 0)
    }

    /// Stop emulation for a short memory update
    pub fn pause_emulation(&mut self) -> Result<()> {
        log::trace!("pausing emulation");
        self.write_fpga_register(fpga_register::STATE, 0)
    }

    /// Restart emulation after [`pause_emulation`](Self::pause_emulation)
    pub fn resume_emulation(&mut self) -> Result<()> {
        log::trace!("resuming emulation");
        self.write_fpga_register(fpga_register::STATE, 1)
    }

    /// Current hold pin configuration
    pub fn hold_pin(&mut self) -> Result<HoldPinState> {
        let value = self.read_fpga_register(fpga_register::HOLD_PIN)?;
        HoldPinState::from_value(value).ok_or(Error::InvalidResponse)
    }

    /// Configure the hold pin
    ///
    /// The current setting has to be acknowledged before the register
    /// accepts a new one; the result is read back and checked.
    pub fn set_hold_pin(&mut self, state: HoldPinState) -> Result<()> {
        let current = self.read_fpga_register(fpga_register::HOLD_PIN)?;
        self.write_fpga_register(fpga_register::HOLD_PIN, current | HOLD_PIN_ACK)?;
        self.read_fpga_register(fpga_register::HOLD_PIN)?;

        self.write_fpga_register(fpga_register::HOLD_PIN, state.value())?;
        let readback = self.read_fpga_register(fpga_register::HOLD_PIN)?;
        if readback != state.value() {
            log::error!(
                "Invalid pin state response: {:#06x} (expected {:#06x} {})",
                readback,
                state.value(),
                state
            );
            return Err(Error::InvalidResponse);
        }
        log::info!("Hold pin state set to {}", state);
        Ok(())
    }

    // ------------------------------------------------------------------
    // SDRAM
    // ------------------------------------------------------------------

    /// Read emulated flash contents
    pub fn read_block(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        self.read_block_with_progress(address, buf, |_| {})
    }

    /// Read emulated flash contents, reporting bytes done after each chunk
    pub fn read_block_with_progress<F: FnMut(usize)>(
        &mut self,
        address: u32,
        buf: &mut [u8],
        mut progress: F,
    ) -> Result<()> {
        let length = u32::try_from(buf.len()).map_err(|_| Error::InvalidArgument)?;
        self.send(Command::ReadSdram { address, length })?;

        let total = buf.len();
        let mut done = 0;
        for chunk in buf.chunks_mut(SDRAM_CHUNK_SIZE) {
            let wanted = chunk.len();
            let actual = self.transport.read_response(chunk)?;
            done += actual;
            progress(done);
            if actual < wanted {
                log::debug!("tried reading {} bytes, got {}", wanted, actual);
                return Err(Error::ShortResponse {
                    expected: total,
                    actual: done,
                });
            }
        }
        log::debug!("read {} bytes at {:#x}", total, address);
        Ok(())
    }

    /// Write emulated flash contents
    pub fn write_block(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.write_block_with_progress(address, data, |_| {})
    }

    /// Write emulated flash contents, reporting bytes done after each chunk
    pub fn write_block_with_progress<F: FnMut(usize)>(
        &mut self,
        address: u32,
        data: &[u8],
        mut progress: F,
    ) -> Result<()> {
        let length = u32::try_from(data.len()).map_err(|_| Error::InvalidArgument)?;
        self.send(Command::WriteSdram { address, length })?;

        let mut done = 0;
        for chunk in data.chunks(SDRAM_CHUNK_SIZE) {
            let actual = self.transport.write_data(chunk)?;
            done += actual;
            progress(done);
            if actual < chunk.len() {
                log::debug!("tried sending {} bytes, sent {}", chunk.len(), actual);
                return Err(Error::ShortResponse {
                    expected: data.len(),
                    actual: done,
                });
            }
        }
        log::debug!("wrote {} bytes at {:#x}", data.len(), address);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hyper terminal
    // ------------------------------------------------------------------

    /// Read a hyper terminal register
    pub fn read_ht_register(&mut self, reg: HtRegister) -> Result<u8> {
        self.send(Command::ReadHtRegister { reg: reg as u8 })?;
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        if buf[0] != 1 {
            return Err(Error::InvalidResponse);
        }
        Ok(buf[1])
    }

    /// Write a hyper terminal register
    pub fn write_ht_register(&mut self, reg: HtRegister, value: u8) -> Result<()> {
        self.send(Command::WriteHtRegister {
            reg: reg as u8,
            value,
        })
    }

    /// Read `buf.len()` bytes from the uFIFO
    pub fn read_ufifo(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() > UFIFO_SIZE {
            return Err(Error::InvalidArgument);
        }
        self.send(Command::ReadUfifo {
            length: buf.len() as u16,
            timeout: 0,
        })?;
        let actual = self.transport.read_response(buf)?;

        // The device always follows up with a short status response
        let mut trailer = [0u8; UFIFO_TRAILER_LENGTH];
        self.transport.read_response(&mut trailer)?;

        if actual != buf.len() {
            return Err(Error::ShortResponse {
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Poll the uFIFO, returning the raw 512-byte block
    pub fn poll_terminal(&mut self) -> Result<[u8; UFIFO_SIZE]> {
        let mut block = [0u8; UFIFO_SIZE];
        self.read_ufifo(&mut block)?;
        Ok(block)
    }

    /// Prepare the appliance for hyper terminal traffic
    pub fn init_terminal(&mut self) -> Result<()> {
        self.write_ht_register(HtRegister::UfifoDataFormat, 0)?;
        self.write_ht_register(HtRegister::Status, HtStatus::START_SPI_EMULATION.bits())?;
        self.write_fpga_register(fpga_register::HT_OPCODE, EM100_SPECIFIC as u16)?;
        self.read_fpga_register(fpga_register::STATE)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Trace
    // ------------------------------------------------------------------

    /// Clear the trace buffer
    pub fn reset_trace(&mut self) -> Result<()> {
        self.send(Command::ResetTrace)
    }

    /// Fetch one batch of trace reports
    ///
    /// Any report that does not arrive in full fails the whole batch.
    pub fn read_trace_batch(&mut self) -> Result<Vec<TraceReport>> {
        self.send(Command::ReadTrace {
            reports: REPORT_BUFFER_COUNT as u32,
            config: TRACE_CONFIG,
        })?;

        let mut reports = Vec::with_capacity(REPORT_BUFFER_COUNT);
        for _ in 0..REPORT_BUFFER_COUNT {
            let mut buf = vec![0u8; REPORT_BUFFER_LENGTH];
            let actual = self.transport.read_response(&mut buf)?;
            buf.truncate(actual);
            reports.push(TraceReport::from_bytes(buf)?);
        }
        Ok(reports)
    }

    /// Fetch and decode one batch of trace reports
    pub fn read_trace(&mut self, state: &mut DecoderState) -> Result<Vec<BusEvent>> {
        let reports = self.read_trace_batch()?;
        decode_batch(&reports, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::protocol::{CommandFrame, COMMAND_LENGTH};
    use crate::trace::ReportBuilder;
    use alloc::collections::VecDeque;

    /// Replays canned responses and records everything sent
    #[derive(Default)]
    struct Script {
        sent: Vec<CommandFrame>,
        written: Vec<u8>,
        responses: VecDeque<Vec<u8>>,
    }

    impl Script {
        fn respond(mut self, data: &[u8]) -> Self {
            self.responses.push_back(data.to_vec());
            self
        }

        fn commands(&self) -> Vec<Command> {
            self.sent.iter().filter_map(Command::decode).collect()
        }
    }

    impl CommandTransport for Script {
        fn send_command(&mut self, frame: &CommandFrame) -> Result<()> {
            assert_eq!(frame.len(), COMMAND_LENGTH);
            self.sent.push(*frame);
            Ok(())
        }

        fn read_response(&mut self, buf: &mut [u8]) -> Result<usize> {
            let data = self.responses.pop_front().ok_or(Error::Timeout)?;
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            Ok(len)
        }

        fn write_data(&mut self, data: &[u8]) -> Result<usize> {
            self.written.extend_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_version() {
        let mut em = Emulator::new(Script::default().respond(&[4, 0x00, 0x4b, 0x02, 0x05]));
        let v = em.get_version().unwrap();
        assert_eq!(v.fpga, 0x004b);
        assert_eq!(v.mcu, 0x0205);

        let mut em = Emulator::new(Script::default().respond(&[1, 2]));
        assert_eq!(em.get_version(), Err(Error::InvalidResponse));
    }

    #[test]
    fn test_fpga_register() {
        let mut em = Emulator::new(Script::default().respond(&[2, 0x12, 0x34]).respond(&[2, 0]));
        assert_eq!(em.read_fpga_register(0x28), Ok(0x1234));
        assert_eq!(
            em.read_fpga_register(0x28),
            Err(Error::ShortResponse {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_hold_pin_sequence() {
        let script = Script::default()
            .respond(&[2, 0, 2])
            .respond(&[2, 0, 6])
            .respond(&[2, 0, 3]);
        let mut em = Emulator::new(script);
        em.set_hold_pin(HoldPinState::Input).unwrap();

        assert_eq!(
            em.transport().commands(),
            vec![
                Command::ReadFpgaRegister { reg: 0x2a },
                Command::WriteFpgaRegister {
                    reg: 0x2a,
                    value: 6
                },
                Command::ReadFpgaRegister { reg: 0x2a },
                Command::WriteFpgaRegister {
                    reg: 0x2a,
                    value: 3
                },
                Command::ReadFpgaRegister { reg: 0x2a },
            ]
        );
    }

    #[test]
    fn test_hold_pin_not_taken() {
        let script = Script::default()
            .respond(&[2, 0, 2])
            .respond(&[2, 0, 6])
            .respond(&[2, 0, 2]);
        let mut em = Emulator::new(script);
        assert_eq!(
            em.set_hold_pin(HoldPinState::Low),
            Err(Error::InvalidResponse)
        );
    }

    #[test]
    fn test_write_block() {
        let mut em = Emulator::new(Script::default());
        em.write_block(0xaa0000, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            em.transport().commands(),
            vec![Command::WriteSdram {
                address: 0xaa0000,
                length: 4
            }]
        );
        assert_eq!(em.transport().written, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_read_block() {
        let mut em = Emulator::new(Script::default().respond(&[9; 10]));
        let mut buf = [0u8; 16];
        assert_eq!(
            em.read_block(0, &mut buf),
            Err(Error::ShortResponse {
                expected: 16,
                actual: 10
            })
        );
    }

    #[test]
    fn test_serial_number() {
        let mut page = [0xffu8; SPI_PAGE_SIZE];
        page[2..6].copy_from_slice(&1234u32.to_le_bytes());
        let mut em = Emulator::new(Script::default().respond(&page).respond(&[0xff; 256]));
        assert_eq!(em.serial_number(), Ok(Some(1234)));
        assert_eq!(em.serial_number(), Ok(None));
    }

    #[test]
    fn test_trace_batch_short_report() {
        let full = ReportBuilder::new().command(1, &[0x06]).build();
        let script = Script::default().respond(&full).respond(&full[..100]);
        let mut em = Emulator::new(script);
        assert_eq!(
            em.read_trace_batch(),
            Err(Error::ShortResponse {
                expected: REPORT_BUFFER_LENGTH,
                actual: 100
            })
        );
    }

    #[test]
    fn test_read_trace() {
        let mut script = Script::default().respond(&ReportBuilder::new().command(1, &[0x06]).build());
        for _ in 1..REPORT_BUFFER_COUNT {
            script = script.respond(&ReportBuilder::new().build());
        }
        let mut em = Emulator::new(script);
        let mut state = DecoderState::new();
        let events = em.read_trace(&mut state).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            em.transport().commands(),
            vec![Command::ReadTrace {
                reports: 8,
                config: 0x15
            }]
        );
    }

    #[test]
    fn test_init_terminal() {
        let mut em = Emulator::new(Script::default().respond(&[2, 0, 1]));
        em.init_terminal().unwrap();
        assert_eq!(
            em.transport().commands(),
            vec![
                Command::WriteHtRegister { reg: 4, value: 0 },
                Command::WriteHtRegister {
                    reg: 0,
                    value: 0x10
                },
                Command::WriteFpgaRegister {
                    reg: 0x82,
                    value: 0x11
                },
                Command::ReadFpgaRegister { reg: 0x28 },
            ]
        );
    }

    #[test]
    fn test_ufifo_reads_trailer() {
        let mut em = Emulator::new(Script::default().respond(&[0u8; 512]).respond(&[0, 0]));
        em.poll_terminal().unwrap();
        assert!(em.transport().responses.is_empty());
    }
}
