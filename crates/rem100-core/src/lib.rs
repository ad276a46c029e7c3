//! rem100-core - Core library for EM100-class SPI flash emulators
//!
//! This crate holds everything that does not depend on a particular
//! transport: the SPI command table, the trace decoder, the write
//! interception queue and its lock handshake, the hyper terminal parser,
//! and the appliance command set built on the [`device::CommandTransport`]
//! trait. It is `no_std` and only needs `alloc`.
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for [`Error`]
//!
//! # Example
//!
//! ```ignore
//! use rem100_core::device::Emulator;
//! use rem100_core::trace::{DecoderState, TraceFormatter};
//!
//! fn trace<T: rem100_core::device::CommandTransport>(em: &mut Emulator<T>) {
//!     let mut state = DecoderState::new();
//!     let mut fmt = TraceFormatter::new(0);
//!     loop {
//!         match em.read_trace(&mut state) {
//!             Ok(events) => print!("{}", fmt.render(&events)),
//!             Err(e) => eprintln!("trace failed: {}", e),
//!         }
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bridge;
pub mod device;
pub mod error;
pub mod spi;
pub mod terminal;
pub mod trace;

pub use error::{Error, Result};
