//! rem100-bridge - Network bridge for EM100Pro SPI flash emulators
//!
//! A bus master that writes to reserved flash offsets can exchange bytes
//! with a TCP peer through the emulator. Writes are intercepted from the
//! trace stream, held back while the master owns the lock word, and then
//! either applied to the flash mirror or forwarded to the peer. Bytes from
//! the peer are staged and published in the message window.
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use rem100_core::device::Emulator;
//! use rem100_dummy::DummyEm100;
//!
//! let mut em100 = Emulator::new(DummyEm100::new_default());
//! let image = std::fs::read("coreboot.rom")?;
//! let stop = AtomicBool::new(false);
//! std::process::exit(rem100_bridge::start_network_bridge(&mut em100, 1234, image, &stop));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod link;
mod relay;
mod session;

pub use error::{BridgeError, Result};
pub use link::{PeerLink, TcpLink, SEND_TIMEOUT};
pub use relay::{serve, serve_listener, start_network_bridge};
pub use session::{check_image, NetworkSession, MIN_IMAGE_SIZE, STAGING_BUFFER_SIZE};
