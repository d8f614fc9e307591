//! In-Memory Transport
//!
//! Records every event instead of delivering it. Backs `--dry-run` and the
//! test suites, and can inject the failures a real browser produces: missing
//! targets, refused attachments, dropped sends, and slow sends (a hold gate
//! that parks the n-th send until released).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info};

use super::{Session, TargetId, Transport};
use crate::error::{Error, Result};
use crate::input::KeyEvent;

/// One recorded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Session the event went through
    pub session_id: String,
    /// The event itself
    pub event: KeyEvent,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<RecordedEvent>,
    open_sessions: HashSet<String>,
    attaches: usize,
    detaches: usize,
    sends_attempted: usize,
    next_session: u64,
    unavailable: HashSet<TargetId>,
    fail_attach: bool,
    fail_send_at: Option<usize>,
    hold_at: Option<usize>,
}

/// Transport that keeps events in memory
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<State>,
    held: Notify,
    release: Semaphore,
    log_events: bool,
}

impl MemoryTransport {
    /// Create a silent recording transport
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            held: Notify::new(),
            release: Semaphore::new(0),
            log_events: false,
        }
    }

    /// Create a transport that logs every event at info level
    pub fn logging() -> Self {
        Self {
            log_events: true,
            ..Self::new()
        }
    }

    /// Report `target` as nonexistent on attach
    pub fn mark_unavailable(&self, target: impl Into<TargetId>) {
        self.state.lock().unavailable.insert(target.into());
    }

    /// Make every attach fail
    pub fn fail_attach(&self, fail: bool) {
        self.state.lock().fail_attach = fail;
    }

    /// Fail the `n`-th send (1-based, counted over the transport lifetime)
    pub fn fail_send_at(&self, n: Option<usize>) {
        self.state.lock().fail_send_at = n;
    }

    /// Park the `n`-th send (1-based) until [`release_hold`](Self::release_hold)
    pub fn hold_send_at(&self, n: Option<usize>) {
        self.state.lock().hold_at = n;
    }

    /// Wait until a send is parked at the hold gate
    pub async fn wait_until_held(&self) {
        self.held.notified().await;
    }

    /// Let the parked send continue
    pub fn release_hold(&self) {
        self.release.add_permits(1);
    }

    /// All recorded events in order
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.state.lock().events.clone()
    }

    /// Only the event payloads, in order
    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.state
            .lock()
            .events
            .iter()
            .map(|recorded| recorded.event.clone())
            .collect()
    }

    /// Text inserted through `char` events, concatenated
    pub fn typed_text(&self) -> String {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|recorded| recorded.event.text.as_deref())
            .collect()
    }

    /// Number of successful attaches
    pub fn attach_count(&self) -> usize {
        self.state.lock().attaches
    }

    /// Number of detach calls that closed an open session
    pub fn detach_count(&self) -> usize {
        self.state.lock().detaches
    }

    /// Sessions currently open
    pub fn open_session_count(&self) -> usize {
        self.state.lock().open_sessions.len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn attach(&self, target: &TargetId) -> Result<Session> {
        let mut state = self.state.lock();

        if state.unavailable.contains(target) {
            return Err(Error::TargetUnavailable(target.to_string()));
        }
        if state.fail_attach {
            return Err(Error::AttachFailed(format!("attach refused by {}", target)));
        }

        state.next_session += 1;
        state.attaches += 1;
        let id = format!("mem-{}-{}", state.next_session, uuid::Uuid::new_v4().simple());
        state.open_sessions.insert(id.clone());

        debug!("Memory transport attached to {} as {}", target, id);
        Ok(Session {
            target: target.clone(),
            id,
        })
    }

    async fn send(&self, session: &Session, event: &KeyEvent) -> Result<()> {
        let (n, hold) = {
            let mut state = self.state.lock();
            if !state.open_sessions.contains(&session.id) {
                return Err(Error::SendFailed(format!("session {} is closed", session.id)));
            }
            state.sends_attempted += 1;
            let n = state.sends_attempted;
            if state.fail_send_at == Some(n) {
                return Err(Error::SendFailed(format!("injected failure at event {}", n)));
            }
            (n, state.hold_at == Some(n))
        };

        if hold {
            self.held.notify_one();
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
        }

        if self.log_events {
            info!(
                "[dry-run] #{} {:?} key={:?} code={:?} text={:?} modifiers={}",
                n,
                event.kind,
                event.key,
                event.code,
                event.text,
                event.modifiers.bits()
            );
        }

        self.state.lock().events.push(RecordedEvent {
            session_id: session.id.clone(),
            event: event.clone(),
        });
        Ok(())
    }

    async fn detach(&self, session: &Session) {
        let mut state = self.state.lock();
        if state.open_sessions.remove(&session.id) {
            state.detaches += 1;
            debug!("Memory transport detached {}", session.id);
        }
    }
}
