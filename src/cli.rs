//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a trace address offset, always hexadecimal
fn parse_offset(s: &str) -> Result<u64, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
}

#[derive(Parser)]
#[command(name = "rem100")]
#[command(author, version, about = "EM100Pro SPI flash emulator control", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Appliance to use: N, bus:address, DPnnnnnn, or "dummy"
    #[arg(short = 'x', long, global = true, default_value = "0")]
    pub device: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Emulation state changes shared by the streaming commands
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct RunArgs {
    /// Start emulation before streaming and leave it running
    #[arg(long, conflicts_with = "stop")]
    pub start: bool,

    /// Stop emulation before streaming and leave it stopped
    #[arg(long)]
    pub stop: bool,
}

impl RunArgs {
    /// Neither start nor stop was requested
    pub fn manages_state(&self) -> bool {
        !self.start && !self.stop
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List attached appliances
    List,

    /// Show versions, serial number and emulation state
    Info,

    /// Start emulation
    Start,

    /// Stop emulation
    Stop,

    /// Set the hold pin state
    Holdpin {
        /// low, float or input
        state: String,
    },

    /// Download an image file into the emulator
    Download {
        /// Image file
        file: PathBuf,

        /// Read the image back and compare
        #[arg(long)]
        verify: bool,

        /// Start emulation afterwards
        #[arg(long)]
        start: bool,
    },

    /// Upload the emulator contents into a file
    Upload {
        /// Output file
        file: PathBuf,

        /// Number of bytes to read (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x4000000")]
        length: u32,
    },

    /// Show SPI bus activity until interrupted
    Trace {
        /// Hex offset added to every displayed address
        #[arg(short = 'O', long, value_parser = parse_offset, default_value = "0")]
        offset: u64,

        /// Also show hyper terminal messages
        #[arg(short = 'T', long)]
        terminal: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show hyper terminal messages until interrupted
    Terminal {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Bridge the bus master to a TCP peer
    Net {
        /// TCP port to listen on
        #[arg(short, long, default_value = "1234")]
        port: u16,

        /// Flash image the bus master runs from
        #[arg(short, long)]
        image: PathBuf,

        /// Assume the emulator already holds the image
        #[arg(long)]
        no_download: bool,
    },
}
