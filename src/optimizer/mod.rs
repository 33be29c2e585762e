//! The optimization loop and its event stream.

pub mod events;
pub mod run;

pub use events::{ChannelSink, ErrorReason, EventSink, MemorySink, OptimizeEvent};
pub use run::{OptimizeOutcome, Optimizer};
