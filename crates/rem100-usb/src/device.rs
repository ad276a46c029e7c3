//! USB bulk transport for the EM100Pro
//!
//! Commands and data go out on EP1, responses come back on EP2. Every
//! transfer uses the same fixed timeout.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, In, Out, TransferError};
use nusb::{Endpoint, Interface, MaybeFuture};
use rem100_core::device::protocol::CommandFrame;
use rem100_core::device::{CommandTransport, Emulator, SerialNumber};
use rem100_core::error::{Error as CoreError, Result as CoreResult};

use crate::error::{Result, UsbError};

/// USB vendor id
pub const EM100_USB_VENDOR: u16 = 0x04b4;
/// USB product id
pub const EM100_USB_PRODUCT: u16 = 0x1235;

/// Bulk OUT endpoint
pub const BULK_OUT_EP: u8 = 0x01;
/// Bulk IN endpoint
pub const BULK_IN_EP: u8 = 0x82;

/// Timeout for every bulk transfer
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(5000);

/// How to pick one appliance when several are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// N-th matching device in enumeration order
    Index(usize),
    /// Device at a bus number and address
    BusAddress {
        /// USB bus number
        bus: u8,
        /// Device address on the bus
        address: u8,
    },
    /// Device whose serial number matches
    Serial(u32),
}

impl Default for DeviceSelector {
    fn default() -> Self {
        DeviceSelector::Index(0)
    }
}

impl FromStr for DeviceSelector {
    type Err = UsbError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || UsbError::InvalidSelector(s.to_string());

        if let Some(serial) = s.strip_prefix("DP").or_else(|| s.strip_prefix("dp")) {
            return serial.parse().map(DeviceSelector::Serial).map_err(|_| invalid());
        }
        if let Some((bus, address)) = s.split_once(':') {
            return Ok(DeviceSelector::BusAddress {
                bus: bus.parse().map_err(|_| invalid())?,
                address: address.parse().map_err(|_| invalid())?,
            });
        }
        s.parse().map(DeviceSelector::Index).map_err(|_| invalid())
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Index(i) => write!(f, "{}", i),
            DeviceSelector::BusAddress { bus, address } => write!(f, "{:03}:{:03}", bus, address),
            DeviceSelector::Serial(s) => write!(f, "{}", SerialNumber(*s)),
        }
    }
}

/// Information about an attached appliance
#[derive(Debug, Clone)]
pub struct Em100DeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// Device address on the bus
    pub address: u8,
}

/// Bulk endpoints of an opened appliance
pub struct UsbTransport {
    _interface: Interface,
    in_ep: Endpoint<Bulk, In>,
    out_ep: Endpoint<Bulk, Out>,
}

impl UsbTransport {
    fn open_device(device_info: &nusb::DeviceInfo) -> Result<Self> {
        log::info!(
            "Opening EM100Pro at bus {} address {}",
            device_info.busnum(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        let in_ep: Endpoint<Bulk, In> = interface
            .endpoint(BULK_IN_EP)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        let out_ep: Endpoint<Bulk, Out> = interface
            .endpoint(BULK_OUT_EP)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        Ok(Self {
            _interface: interface,
            in_ep,
            out_ep,
        })
    }

    fn bulk_write(&mut self, data: &[u8]) -> CoreResult<usize> {
        let mut out_buf = Buffer::new(data.len());
        out_buf.extend_from_slice(data);

        let completion = self.out_ep.transfer_blocking(out_buf, TRANSFER_TIMEOUT);
        completion.into_result().map_err(transfer_error)?;
        Ok(data.len())
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        let max_packet_size = self.in_ep.max_packet_size();
        let request_len = buf.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = self.in_ep.transfer_blocking(in_buf, TRANSFER_TIMEOUT);
        let data = completion.into_result().map_err(transfer_error)?;

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }
}

fn transfer_error(e: TransferError) -> CoreError {
    log::debug!("USB transfer failed: {}", e);
    match e {
        TransferError::Cancelled => CoreError::Timeout,
        _ => CoreError::TransportError,
    }
}

impl CommandTransport for UsbTransport {
    fn send_command(&mut self, frame: &CommandFrame) -> CoreResult<()> {
        let sent = self.bulk_write(frame)?;
        if sent != frame.len() {
            return Err(CoreError::TransportError);
        }
        Ok(())
    }

    fn read_response(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        self.bulk_read(buf)
    }

    fn write_data(&mut self, data: &[u8]) -> CoreResult<usize> {
        self.bulk_write(data)
    }
}

fn matching_devices() -> Result<Vec<nusb::DeviceInfo>> {
    Ok(nusb::list_devices()
        .wait()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == EM100_USB_VENDOR && d.product_id() == EM100_USB_PRODUCT)
        .collect())
}

/// List all attached appliances
pub fn list_devices() -> Result<Vec<Em100DeviceInfo>> {
    Ok(matching_devices()?
        .iter()
        .map(|d| Em100DeviceInfo {
            bus: d.busnum(),
            address: d.device_address(),
        })
        .collect())
}

/// Open one appliance
///
/// Selecting by serial number opens every attached appliance in turn and
/// reads its serial number.
pub fn open(selector: &DeviceSelector) -> Result<Emulator<UsbTransport>> {
    let devices = matching_devices()?;
    if devices.is_empty() {
        return Err(UsbError::DeviceNotFound);
    }

    let device_info = match selector {
        DeviceSelector::Index(i) => devices.get(*i).ok_or(UsbError::DeviceNotFound)?,
        DeviceSelector::BusAddress { bus, address } => devices
            .iter()
            .find(|d| d.busnum() == *bus && d.device_address() == *address)
            .ok_or(UsbError::DeviceNotFound)?,
        DeviceSelector::Serial(wanted) => {
            for device_info in &devices {
                let Ok(transport) = UsbTransport::open_device(device_info) else {
                    continue;
                };
                let mut em100 = Emulator::new(transport);
                match em100.serial_number() {
                    Ok(Some(serial)) if serial == *wanted => {
                        log::info!("Found EM100Pro {}", SerialNumber(serial));
                        return Ok(em100);
                    }
                    _ => continue,
                }
            }
            return Err(UsbError::SerialNotFound(SerialNumber(*wanted).to_string()));
        }
    };

    Ok(Emulator::new(UsbTransport::open_device(device_info)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector() {
        assert_eq!("2".parse::<DeviceSelector>().unwrap(), DeviceSelector::Index(2));
        assert_eq!(
            "1:12".parse::<DeviceSelector>().unwrap(),
            DeviceSelector::BusAddress { bus: 1, address: 12 }
        );
        assert_eq!(
            "DP012345".parse::<DeviceSelector>().unwrap(),
            DeviceSelector::Serial(12345)
        );
        assert!("1:x".parse::<DeviceSelector>().is_err());
        assert!("abc".parse::<DeviceSelector>().is_err());
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(DeviceSelector::Serial(42).to_string(), "DP000042");
        assert_eq!(
            DeviceSelector::BusAddress { bus: 3, address: 7 }.to_string(),
            "003:007"
        );
    }
}
