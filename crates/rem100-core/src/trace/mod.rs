//! SPI bus trace capture
//!
//! - [`report`]: the 8192-byte report buffers read from the device
//! - [`decoder`]: turns reports into bus events
//! - [`format`]: renders events as text

pub mod decoder;
pub mod format;
pub mod report;

pub use decoder::{decode_batch, BusEvent, DecoderState};
pub use format::TraceFormatter;
pub use report::{ReportBuilder, TraceRecord, TraceReport};
