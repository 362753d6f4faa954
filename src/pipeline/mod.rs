//! The capture-to-reply pipeline.
//!
//! Three stages connected by bounded channels: a blocking capture
//! stage producing audio segments, a blocking recognition stage
//! producing transcripts, and the async turn loop that owns session
//! state and talks to the reasoning engine.

pub mod coordinator;
pub mod messages;
pub mod queue;

pub use coordinator::SessionCoordinator;
pub use messages::{AudioSegment, TextInjection, Transcript};
