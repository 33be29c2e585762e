//! Trajectory recording and generation.
//!
//! A trajectory is the conversation produced by executing a candidate prompt
//! against a sample's user input.

pub mod generator;
pub mod types;

pub use generator::{GenerationMode, GeneratorConfig, TrajectoryGenerator, GENERATION_ERROR_MARKER};
pub use types::Trajectory;
