//! Backend registration and dispatch
//!
//! Backends are included by cargo feature. The `-x/--device` argument picks
//! one: the literal `dummy` selects the in-memory emulator, anything else is
//! handed to the USB backend as a device selector.

use rem100_core::device::{CommandTransport, Emulator};
use thiserror::Error;

/// An opened appliance, whatever the backend
pub type Device = Emulator<Box<dyn CommandTransport>>;

/// Information about a backend
pub struct BackendInfo {
    /// Name shown by `list`
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Errors raised while choosing a backend
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The selector names a backend this build does not include
    #[error("No backend for device '{0}' (available: {1})")]
    Unavailable(String, String),
}

/// Get information about all backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "usb")]
    backends.push(BackendInfo {
        name: "usb",
        description: "EM100Pro over USB (VID:04b4 PID:1235), -x N, bus:address or DPnnnnnn",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        description: "In-memory EM100 emulator for testing, -x dummy",
    });

    backends
}

/// Short list of backend names
pub fn backend_names_short() -> String {
    let backends = available_backends();
    let names: Vec<&str> = backends.iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Open the appliance named by `device`
#[allow(unreachable_code)]
pub fn open_device(device: &str) -> Result<Device, Box<dyn std::error::Error>> {
    #[cfg(feature = "dummy")]
    if device == "dummy" {
        log::info!("Using in-memory EM100 emulator");
        let transport: Box<dyn CommandTransport> =
            Box::new(rem100_dummy::DummyEm100::new_default());
        return Ok(Emulator::new(transport));
    }

    #[cfg(feature = "usb")]
    {
        let selector: rem100_usb::DeviceSelector = device.parse()?;
        let transport: Box<dyn CommandTransport> =
            Box::new(rem100_usb::open(&selector)?.into_inner());
        return Ok(Emulator::new(transport));
    }

    Err(DeviceError::Unavailable(device.to_string(), backend_names_short()).into())
}
