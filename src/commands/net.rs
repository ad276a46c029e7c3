//! Network bridge command

use rem100_core::device::{CommandTransport, Emulator};
use std::path::Path;
use std::sync::atomic::AtomicBool;

use super::image::{download_image, load_image};
use super::CmdResult;

/// Bridge the bus master to one TCP peer, returning the exit status
pub fn run_net<T: CommandTransport>(
    em100: &mut Emulator<T>,
    port: u16,
    image: &Path,
    no_download: bool,
    stop: &AtomicBool,
) -> CmdResult<i32> {
    let data = load_image(image)?;
    rem100_bridge::check_image(&data)?;

    if no_download {
        log::info!("Assuming the emulator already holds {:?}", image);
    } else {
        em100.pause_emulation()?;
        let downloaded = download_image(em100, &data);
        em100.resume_emulation()?;
        downloaded?;
    }
    em100.set_running(true)?;

    println!("Listening on port {}. Press CTL-C to exit.", port);
    Ok(rem100_bridge::start_network_bridge(em100, port, data, stop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rem100_core::device::protocol::fpga_register;
    use rem100_core::device::Command;
    use rem100_dummy::DummyEm100;
    use std::env;
    use std::fs;

    #[test]
    fn test_small_image_is_rejected_before_download() {
        let path = env::temp_dir().join(format!("rem100-net-{}.bin", std::process::id()));
        fs::write(&path, [0xffu8; 0x1000]).unwrap();

        let mut em100 = Emulator::new(DummyEm100::new_default());
        let stop = AtomicBool::new(true);
        assert!(run_net(&mut em100, 0, &path, false, &stop).is_err());
        assert_eq!(em100.transport().sdram()[0], 0xff);
        assert!(em100.transport().commands().is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_image_download_pauses_emulation() {
        let path = env::temp_dir().join(format!("rem100-net-pause-{}.bin", std::process::id()));
        fs::write(&path, vec![0x5au8; rem100_bridge::MIN_IMAGE_SIZE]).unwrap();

        let mut em100 = Emulator::new(DummyEm100::new_default());
        em100.set_running(true).unwrap();
        let stop = AtomicBool::new(true);
        assert_eq!(run_net(&mut em100, 0, &path, false, &stop).unwrap(), 0);
        fs::remove_file(&path).unwrap();

        let commands = em100.transport().commands();
        let first_write = commands
            .iter()
            .position(|c| matches!(c, Command::WriteSdram { .. }))
            .unwrap();
        let stopped = Command::WriteFpgaRegister {
            reg: fpga_register::STATE,
            value: 0,
        };
        assert!(commands[1..first_write].contains(&stopped));
        assert!(em100.transport().is_running());
        assert_eq!(em100.transport().sdram()[0x100], 0x5a);
    }
}
