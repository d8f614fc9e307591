//! Utility Functions
//!
//! User-friendly error formatting for the command-line front end.
//!
//! ```rust,no_run
//! use cdp_typist::utils::format_user_error;
//!
//! # fn operation() -> anyhow::Result<()> { Ok(()) }
//! if let Err(e) = operation() {
//!     eprintln!("{}", format_user_error(&e));
//! }
//! ```
//!
//! Error categories with context-aware help:
//! - Target errors → list tabs, pick a target id
//! - Connection errors → remote debugging flag, endpoint discovery
//! - Delivery errors → job paused, resume hint
//! - Config errors → syntax and range checks

pub mod errors;

pub use errors::format_user_error;
