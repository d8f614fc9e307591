//! Keystroke Synthesis
//!
//! Character → key metadata → ordered key events.
//!
//! ```text
//! 'A' ──KeyMapper──> KeyMeta { code: "KeyA", base_key: "a", shift }
//!                        │
//!                   key_events()
//!                        ↓
//! Shift↓  a↓(⇧)  char "A"  a↑(⇧)  Shift↑
//! ```
//!
//! - [`keymap`] - character → [`KeyMeta`] tables, legacy key codes
//! - [`event`] - the [`KeyEvent`] wire payload and modifier bits
//! - [`sequencer`] - event ordering and emission through a transport

pub mod event;
pub mod keymap;
pub mod sequencer;

pub use event::{KeyEvent, KeyEventType, Modifier};
pub use keymap::{map_char, Dialect, KeyMapper, KeyMeta};
pub use sequencer::{emit, emit_layout_toggle, key_events, layout_toggle_events};
