//! # cdp-typist
//!
//! Types text into a browser tab by synthesizing keystrokes over the Chrome
//! DevTools Protocol, one character at a time, at a human-like pace. A typing
//! job can be paused, resumed from where it stopped, or cancelled.
//!
//! # Architecture
//!
//! ```text
//! cdp-typist
//!   ├─> Layout Corrector (wrong-layout text → intended text + toggle points)
//!   ├─> Key Mapper (character → key identity, Shift, legacy key code)
//!   ├─> Event Sequencer (key metadata → ordered key events)
//!   ├─> Job Scheduler (one job per tab: start / stop / resume / status)
//!   └─> Transport (DevTools WebSocket, or in-memory for dry runs)
//! ```
//!
//! # Data Flow
//!
//! **Typing Path:** Request → Dispatcher → Job Scheduler → Key Mapper →
//! Event Sequencer → Transport → Tab
//!
//! **Control Path:** STOP / RESUME / STATUS → Dispatcher → Job Scheduler

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error taxonomy
pub mod error;

/// Wrong-keyboard-layout correction
pub mod layout;

/// Keystroke synthesis
pub mod input;

/// Remote transport contract and implementations
pub mod transport;

/// Per-target typing jobs
pub mod scheduler;

/// Caller request/response messages
pub mod protocol;

/// Request dispatch and JSON-lines serving
pub mod server;

/// Configuration
pub mod config;

/// Persisted typing-rate preference
pub mod preferences;

/// Utility functions
pub mod utils;

pub use error::{Error, Result};
