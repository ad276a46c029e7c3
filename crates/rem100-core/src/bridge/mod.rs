//! Write interception and the bus master signaling protocol

pub mod memory_map;
pub mod queue;

pub use memory_map::{region_of, Region};
pub use queue::{FlashLockState, PendingWriteRequest, WriteApplier, WriteQueue};
