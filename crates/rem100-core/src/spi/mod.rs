//! SPI command knowledge
//!
//! Opcode constants and the classification table used to split traced
//! commands into opcode, address, dummy bytes and payload.

pub mod classify;
pub mod opcodes;

pub use classify::{lookup, Classifier, CommandDescriptor, COMMANDS, UNKNOWN_COMMAND};
