//! Remote Transport Abstraction
//!
//! The scheduler never talks to a browser directly. It needs three things
//! from whatever carries input to the target:
//!
//! - open an exclusive session on a target ([`Transport::attach`])
//! - push one key event through that session ([`Transport::send`])
//! - close the session again ([`Transport::detach`]), idempotently and
//!   without failing
//!
//! Implementations:
//! - [`cdp::CdpTransport`] - Chrome DevTools Protocol over a browser WebSocket
//! - [`memory::MemoryTransport`] - records events in memory (dry-run, tests)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::input::KeyEvent;

pub mod cdp;
pub mod memory;

pub use cdp::{CdpTransport, TargetInfo};
pub use memory::MemoryTransport;

/// Identifier of an addressable target (one browser tab)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Selector that resolves to the first page target
    pub const FIRST: &'static str = "first";

    /// Create a target identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier means "whichever page comes first"
    pub fn is_first_page(&self) -> bool {
        self.0.is_empty() || self.0 == Self::FIRST
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An open attachment to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Target the session is attached to, as resolved by the transport
    pub target: TargetId,
    /// Transport-specific session identifier
    pub id: String,
}

/// Carrier for synthesized input
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name
    fn name(&self) -> &'static str;

    /// Open an exclusive session on `target`
    ///
    /// # Errors
    ///
    /// [`Error::TargetUnavailable`](crate::Error::TargetUnavailable) when no
    /// such target exists, [`Error::AttachFailed`](crate::Error::AttachFailed)
    /// when it exists but refused the attachment.
    async fn attach(&self, target: &TargetId) -> Result<Session>;

    /// Dispatch one key event through `session`
    async fn send(&self, session: &Session, event: &KeyEvent) -> Result<()>;

    /// Close `session`. Never fails; repeated calls are harmless.
    async fn detach(&self, session: &Session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id_first_page() {
        assert!(TargetId::new("").is_first_page());
        assert!(TargetId::new("first").is_first_page());
        assert!(!TargetId::new("9A1F").is_first_page());
    }

    #[test]
    fn test_target_id_serde_transparent() {
        let id: TargetId = serde_json::from_str("\"tab-1\"").unwrap();
        assert_eq!(id.as_str(), "tab-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"tab-1\"");
    }
}
