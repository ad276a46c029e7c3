//! Device information and control commands

use rem100_core::device::{CommandTransport, Emulator, HoldPinState, SerialNumber};

use super::CmdResult;
use crate::devices::available_backends;

/// List backends and attached appliances
pub fn run_list() -> CmdResult {
    println!("Supported backends:");
    println!();
    for backend in available_backends() {
        println!("  {:8} - {}", backend.name, backend.description);
    }

    #[cfg(feature = "usb")]
    {
        println!();
        let devices = rem100_usb::list_devices()?;
        if devices.is_empty() {
            println!("No EM100Pro attached");
        }
        for (index, device) in devices.iter().enumerate() {
            println!(
                "  {}: EM100Pro on Bus {:03} Device {:03} (-x {}:{})",
                index, device.bus, device.address, device.bus, device.address
            );
        }
    }

    Ok(())
}

/// Print versions, serial number, emulation state and hold pin
pub fn run_info<T: CommandTransport>(em100: &mut Emulator<T>) -> CmdResult {
    let version = em100.get_version()?;
    println!("{}", version);

    match em100.serial_number()? {
        Some(serial) => println!("Serial number: {}", SerialNumber(serial)),
        None => println!("Serial number: not set"),
    }

    let state = if em100.is_running()? {
        "running"
    } else {
        "stopped"
    };
    println!("EM100Pro currently {}", state);
    println!("Hold pin: {}", em100.hold_pin()?);
    Ok(())
}

/// Start or stop emulation
pub fn run_set_state<T: CommandTransport>(em100: &mut Emulator<T>, run: bool) -> CmdResult {
    em100.set_running(run)?;
    Ok(())
}

/// Set the hold pin from its name
pub fn run_holdpin<T: CommandTransport>(em100: &mut Emulator<T>, name: &str) -> CmdResult {
    let state = HoldPinState::from_name(name)
        .ok_or_else(|| format!("Invalid hold pin state '{}', expected low, float or input", name))?;
    em100
        .set_hold_pin(state)
        .map_err(|e| format!("Failed configuring hold pin state: {}", e))?;
    println!("Hold pin set to {}", state);
    Ok(())
}
