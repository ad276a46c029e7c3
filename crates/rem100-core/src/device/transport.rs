//! Transport seam between the command set and a concrete backend

use super::protocol::CommandFrame;
use crate::error::Result;

/// Moves command frames and data blocks to and from an appliance
///
/// Implemented over USB bulk endpoints for real hardware and in memory
/// by the software emulator.
pub trait CommandTransport {
    /// Send one 16-byte command frame
    ///
    /// Succeeds only if the whole frame was accepted.
    fn send_command(&mut self, frame: &CommandFrame) -> Result<()>;

    /// Receive up to `buf.len()` bytes, returning how many arrived
    ///
    /// A shorter answer is not an error at this level; callers decide what
    /// length they need.
    fn read_response(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Send a data block following a command, returning bytes accepted
    fn write_data(&mut self, data: &[u8]) -> Result<usize>;
}

impl<T: CommandTransport + ?Sized> CommandTransport for &mut T {
    fn send_command(&mut self, frame: &CommandFrame) -> Result<()> {
        (**self).send_command(frame)
    }

    fn read_response(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_response(buf)
    }

    fn write_data(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write_data(data)
    }
}

impl<T: CommandTransport + ?Sized> CommandTransport for alloc::boxed::Box<T> {
    fn send_command(&mut self, frame: &CommandFrame) -> Result<()> {
        (**self).send_command(frame)
    }

    fn read_response(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_response(buf)
    }

    fn write_data(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write_data(data)
    }
}
