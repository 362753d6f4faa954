//! Iris: a spoken-dialogue session controller.
//!
//! This crate wires a voice session together:
//! Microphone → segmentation → recognition → dispatch → engine → speech
//!
//! # Architecture
//!
//! Three stages connected by bounded channels:
//! - **Audio capture**: records from the microphone via `cpal` and cuts
//!   the stream into utterances with an energy-based segmenter
//! - **Recognition**: transcribes each utterance through an external
//!   transcriber CLI, then filters recognizer hallucinations
//! - **Turn loop**: a single async task owning the session mode machine,
//!   the reasoning engine conversation, and the action registry
//!
//! The session sleeps and wakes on a fuzzy wake word, and the engine can
//! request registered actions through structured blocks in its replies.

pub mod actions;
pub mod audio;
pub mod config;
pub mod dictation;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod recognizer;
pub mod runtime;
pub mod session;
pub mod speech;
pub mod wakeword;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use pipeline::coordinator::SessionCoordinator;
pub use runtime::{RuntimeEvent, RuntimeEvents};
pub use session::{SessionMode, SessionState};
