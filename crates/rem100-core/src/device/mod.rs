//! Appliance command set
//!
//! [`CommandTransport`] is the seam to a backend; [`Emulator`] builds the
//! register, memory, terminal and trace operations on top of it.

mod emulator;
pub mod protocol;
mod transport;

pub use emulator::Emulator;
pub use protocol::{Command, HoldPinState, SerialNumber, Version};
pub use transport::CommandTransport;
