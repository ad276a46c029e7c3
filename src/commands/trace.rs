//! Trace and hyper terminal display

use rem100_core::device::{CommandTransport, Emulator, HoldPinState};
use rem100_core::terminal::{parse_ufifo, TerminalPrinter};
use rem100_core::trace::{BusEvent, DecoderState, TraceFormatter};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use super::CmdResult;
use crate::cli::RunArgs;

/// Live view of the SPI bus and, optionally, the hyper terminal
pub struct TraceView {
    state: DecoderState,
    formatter: TraceFormatter,
    printer: TerminalPrinter,
    terminal: bool,
}

impl TraceView {
    /// Create a view adding `offset` to every displayed address
    pub fn new(offset: u64, terminal: bool) -> Self {
        Self {
            state: DecoderState::new(),
            formatter: TraceFormatter::new(offset),
            printer: TerminalPrinter::new(),
            terminal,
        }
    }

    /// Fetch one trace batch and print it
    ///
    /// A failed batch is reported and skipped. With the terminal enabled the
    /// uFIFO is polled on every timestamp record, and a failed poll is
    /// reported without ending the trace.
    pub fn poll<T: CommandTransport, W: Write>(
        &mut self,
        em100: &mut Emulator<T>,
        out: &mut W,
    ) -> CmdResult {
        let events = match em100.read_trace(&mut self.state) {
            Ok(events) => events,
            Err(e) => {
                log::warn!("Trace read failed: {}", e);
                return Ok(());
            }
        };

        let mut text = String::new();
        for event in &events {
            self.formatter.write_event(&mut text, event)?;
            if self.terminal && matches!(event, BusEvent::Timestamp(_)) {
                match em100.poll_terminal() {
                    Ok(block) => {
                        self.printer
                            .write_messages(&mut text, &parse_ufifo(&block), true)?;
                    }
                    Err(e) => log::warn!("Terminal read failed: {}", e),
                }
            }
        }

        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Live view of the hyper terminal alone
#[derive(Default)]
pub struct TerminalView {
    printer: TerminalPrinter,
}

impl TerminalView {
    /// Read the uFIFO once and print its messages
    pub fn poll<T: CommandTransport, W: Write>(
        &mut self,
        em100: &mut Emulator<T>,
        out: &mut W,
    ) -> CmdResult {
        let block = em100.poll_terminal()?;
        let messages = parse_ufifo(&block);
        if messages.is_empty() {
            return Ok(());
        }

        let mut text = String::new();
        self.printer.write_messages(&mut text, &messages, false)?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Put the appliance into streaming mode
fn prepare<T: CommandTransport>(
    em100: &mut Emulator<T>,
    run: RunArgs,
    trace: bool,
    terminal: bool,
) -> CmdResult {
    if run.stop {
        em100.set_running(false)?;
    }
    if run.start {
        em100.set_running(true)?;
    }

    em100
        .set_hold_pin(HoldPinState::Input)
        .map_err(|e| format!("Failed to set EM100 to input: {}", e))?;

    if run.manages_state() {
        em100.set_running(true)?;
    }

    let mut what = Vec::new();
    if trace {
        em100.reset_trace()?;
        what.push("trace");
    }
    if terminal {
        em100.init_terminal()?;
        what.push("terminal");
    }
    println!("Starting {}. Press CTL-C to exit.\n", what.join(" & "));
    Ok(())
}

/// Undo what [`prepare`] changed
fn restore<T: CommandTransport>(em100: &mut Emulator<T>, run: RunArgs, trace: bool) -> CmdResult {
    if run.manages_state() {
        em100.set_running(false)?;
    }
    if trace {
        em100.reset_trace()?;
    }
    em100
        .set_hold_pin(HoldPinState::Float)
        .map_err(|e| format!("Failed to set EM100 to float: {}", e))?;
    Ok(())
}

/// Show bus activity until `stop` is set
pub fn run_trace<T: CommandTransport>(
    em100: &mut Emulator<T>,
    offset: u64,
    terminal: bool,
    run: RunArgs,
    stop: &AtomicBool,
) -> CmdResult {
    prepare(em100, run, true, terminal)?;

    let mut view = TraceView::new(offset, terminal);
    let mut stdout = std::io::stdout();
    let mut result = Ok(());
    while !stop.load(Ordering::SeqCst) {
        result = view.poll(em100, &mut stdout);
        if result.is_err() {
            break;
        }
    }
    println!();

    restore(em100, run, true)?;
    result
}

/// Show hyper terminal messages until `stop` is set
pub fn run_terminal<T: CommandTransport>(
    em100: &mut Emulator<T>,
    run: RunArgs,
    stop: &AtomicBool,
) -> CmdResult {
    prepare(em100, run, false, true)?;

    let mut view = TerminalView::default();
    let mut stdout = std::io::stdout();
    let mut result = Ok(());
    while !stop.load(Ordering::SeqCst) {
        result = view.poll(em100, &mut stdout);
        if result.is_err() {
            break;
        }
    }
    println!();

    restore(em100, run, false)?;
    result
}
