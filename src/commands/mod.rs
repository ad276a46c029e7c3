//! CLI command implementations
//!
//! Every command works on an opened [`Emulator`](rem100_core::device::Emulator)
//! regardless of the backend behind it. The streaming commands (`trace`,
//! `terminal`, `net`) run until interrupted with Ctrl-C.

pub mod image;
pub mod info;
pub mod net;
pub mod trace;

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result type shared by the commands
pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Flag set once the user presses Ctrl-C
pub fn interrupt_flag() -> Arc<AtomicBool> {
    let exit_requested = Arc::new(AtomicBool::new(false));
    let exit_clone = exit_requested.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        exit_clone.store(true, Ordering::SeqCst);
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }
    exit_requested
}

/// Progress bar for an SDRAM transfer
pub fn transfer_bar(total: usize, phase: &str) -> CmdResult<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
