//! rem100 - Control tool for EM100Pro SPI flash emulators
//!
//! Downloads and uploads images, shows live SPI bus traces and hyper
//! terminal output, and bridges a bus master to a TCP peer through
//! reserved flash offsets.
//!
//! # Architecture
//!
//! All protocol logic lives in `rem100-core` and is generic over a
//! `CommandTransport`. Backends provide the transport:
//! - **usb** - a real appliance on its bulk endpoints
//! - **dummy** - an in-memory emulator for testing
//!
//! The network bridge in `rem100-bridge` runs on top of the same command
//! set.

mod cli;
mod commands;
mod devices;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Commands::List = cli.command {
        return commands::info::run_list();
    }

    let mut em100 = devices::open_device(&cli.device)?;

    match cli.command {
        Commands::List => Ok(()),
        Commands::Info => commands::info::run_info(&mut em100),
        Commands::Start => commands::info::run_set_state(&mut em100, true),
        Commands::Stop => commands::info::run_set_state(&mut em100, false),
        Commands::Holdpin { state } => commands::info::run_holdpin(&mut em100, &state),
        Commands::Download {
            file,
            verify,
            start,
        } => commands::image::run_download(&mut em100, &file, verify, start),
        Commands::Upload { file, length } => commands::image::run_upload(&mut em100, &file, length),
        Commands::Trace {
            offset,
            terminal,
            run,
        } => {
            let stop = commands::interrupt_flag();
            commands::trace::run_trace(&mut em100, offset, terminal, run, &stop)
        }
        Commands::Terminal { run } => {
            let stop = commands::interrupt_flag();
            commands::trace::run_terminal(&mut em100, run, &stop)
        }
        Commands::Net {
            port,
            image,
            no_download,
        } => {
            let stop = commands::interrupt_flag();
            let status = commands::net::run_net(&mut em100, port, &image, no_download, &stop)?;
            if status != 0 {
                eprintln!("Network bridge failed");
                std::process::exit(status);
            }
            Ok(())
        }
    }
}
