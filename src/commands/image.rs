//! Image download and upload

use rem100_core::device::{CommandTransport, Emulator};
use std::fs;
use std::path::Path;

use super::{transfer_bar, CmdResult};

/// Largest image the emulator holds (64 MiB)
pub const MAX_IMAGE_SIZE: usize = 0x400_0000;

/// Write `data` to the start of emulator memory with a progress bar
pub fn download_image<T: CommandTransport>(em100: &mut Emulator<T>, data: &[u8]) -> CmdResult {
    let pb = transfer_bar(data.len(), "Downloading")?;
    em100.write_block_with_progress(0, data, |done| pb.set_position(done as u64))?;
    pb.finish_with_message("Download complete");
    Ok(())
}

/// Read `length` bytes from the start of emulator memory with a progress bar
pub fn upload_image<T: CommandTransport>(
    em100: &mut Emulator<T>,
    length: usize,
) -> CmdResult<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(length)
        .map_err(|_| format!("Could not allocate {} bytes", length))?;
    data.resize(length, 0);

    let pb = transfer_bar(length, "Uploading")?;
    em100.read_block_with_progress(0, &mut data, |done| pb.set_position(done as u64))?;
    pb.finish_with_message("Upload complete");
    Ok(data)
}

/// Load an image file, refusing empty and oversized files
pub fn load_image(path: &Path) -> CmdResult<Vec<u8>> {
    let data = fs::read(path)?;
    if data.is_empty() {
        return Err(format!("No data to download in {}", path.display()).into());
    }
    if data.len() > MAX_IMAGE_SIZE {
        return Err(format!(
            "{} is {} bytes, the emulator holds at most {}",
            path.display(),
            data.len(),
            MAX_IMAGE_SIZE
        )
        .into());
    }
    Ok(data)
}

/// Download an image file, optionally verifying it
pub fn run_download<T: CommandTransport>(
    em100: &mut Emulator<T>,
    file: &Path,
    verify: bool,
    start: bool,
) -> CmdResult {
    let data = load_image(file)?;
    download_image(em100, &data)?;
    println!("Downloaded {} bytes from {:?}", data.len(), file);

    if verify {
        let readback = upload_image(em100, data.len())?;
        if readback != data {
            println!("Verify: FAIL");
            return Err("Verification failed".into());
        }
        println!("Verify: PASS");
    }

    if start {
        em100.set_running(true)?;
    }
    Ok(())
}

/// Upload emulator memory into a file
pub fn run_upload<T: CommandTransport>(
    em100: &mut Emulator<T>,
    file: &Path,
    length: u32,
) -> CmdResult {
    let data = upload_image(em100, length as usize)?;
    fs::write(file, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), file);
    Ok(())
}
