//! rem100-usb - USB transport for EM100Pro SPI flash emulators
//!
//! Implements [`rem100_core::device::CommandTransport`] over the
//! appliance's bulk endpoints and handles device enumeration.
//!
//! # Example
//!
//! ```no_run
//! use rem100_usb::DeviceSelector;
//!
//! let mut em100 = rem100_usb::open(&DeviceSelector::default())?;
//! println!("{}", em100.get_version()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;

pub use device::{
    list_devices, open, DeviceSelector, Em100DeviceInfo, UsbTransport, EM100_USB_PRODUCT,
    EM100_USB_VENDOR,
};
pub use error::{Result, UsbError};
