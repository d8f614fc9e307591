//! Job State Machine
//!
//! A [`Job`] is the run record for one typing operation on one target.
//! Every transition is a method here; the scheduler only decides *when*
//! to call them.
//!
//! ```text
//!            start                    cursor == len
//!   Idle ───────────> Running ───────────────────────> Idle (job removed)
//!                      │   ↑
//!        stop / error  │   │ resume
//!                      ↓   │
//!                     Paused ──── second stop ────────> Idle (job removed)
//! ```
//!
//! Ownership of the cursor is tracked with a run token: each start or
//! resume hands out a new token, and a loop whose token no longer matches
//! has been superseded and must exit without touching the job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Session;

/// Job lifecycle state (absence of a job means idle)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// An execution loop owns the cursor
    Running,
    /// Cursor frozen, job retained for resume
    Paused,
}

/// Characters per second, always finite and positive
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct TypingRate(f64);

impl TypingRate {
    /// Rate used when nothing else is configured
    pub const DEFAULT: TypingRate = TypingRate(40.0);

    /// Validate a rate
    pub fn new(chars_per_second: f64) -> Result<Self> {
        if chars_per_second.is_finite() && chars_per_second > 0.0 {
            Ok(Self(chars_per_second))
        } else {
            Err(Error::InvalidRate(chars_per_second))
        }
    }

    /// Characters per second
    pub fn get(self) -> f64 {
        self.0
    }

    /// Pause between characters, `None` when it rounds to zero milliseconds
    pub fn delay(self) -> Option<Duration> {
        let millis = (1000.0 / self.0).round();
        if millis >= 1.0 {
            Some(Duration::from_millis(millis as u64))
        } else {
            None
        }
    }
}

impl Default for TypingRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<f64> for TypingRate {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TypingRate> for f64 {
    fn from(rate: TypingRate) -> Self {
        rate.0
    }
}

/// Read-only view of a target's job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    /// No job for the target
    Idle,
    /// Loop advancing the cursor
    Running {
        /// Index of the next character
        cursor: usize,
        /// Total characters
        length: usize,
    },
    /// Suspended
    Paused {
        /// Index of the next character
        cursor: usize,
        /// Total characters
        length: usize,
    },
}

/// What a loop should do next
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Emit `ch` (after the layout toggle, if `toggle`) through `session`
    Emit {
        /// Character at the cursor
        ch: char,
        /// Whether the layout toggle precedes it
        toggle: bool,
        /// Session to emit through
        session: Session,
    },
    /// Cancellation observed; job is paused at `cursor`
    Cancelled {
        /// Frozen cursor
        cursor: usize,
    },
    /// Every character has been emitted
    Exhausted,
    /// This loop no longer owns the job
    Superseded,
}

/// Mutable run record for one target
#[derive(Debug, Clone)]
pub struct Job {
    id: u64,
    run: u64,
    state: JobState,
    text: Vec<char>,
    cursor: usize,
    toggle_at: BTreeSet<usize>,
    toggle_sent_at: Option<usize>,
    cancel_requested: bool,
    rate: TypingRate,
    session: Option<Session>,
}

impl Job {
    /// Create a running job with `cursor = 0` and no session yet
    pub fn new(
        id: u64,
        text: Vec<char>,
        toggles: impl IntoIterator<Item = usize>,
        rate: TypingRate,
    ) -> Self {
        let len = text.len();
        Self {
            id,
            run: 1,
            state: JobState::Running,
            toggle_at: toggles.into_iter().filter(|&i| i < len).collect(),
            text,
            cursor: 0,
            toggle_sent_at: None,
            cancel_requested: false,
            rate,
            session: None,
        }
    }

    /// Job identity, unique per start
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current run token
    pub fn run(&self) -> u64 {
        self.run
    }

    /// Lifecycle state
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Index of the next character
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Total characters
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the text is empty
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether every character has been emitted
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.text.len()
    }

    /// Whether a cancellation is pending
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Pacing rate
    pub fn rate(&self) -> TypingRate {
        self.rate
    }

    /// Whether a session is attached
    pub fn session_open(&self) -> bool {
        self.session.is_some()
    }

    /// Record the session opened for this job
    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    /// Hand the session over for closing
    pub fn take_session(&mut self) -> Option<Session> {
        self.session.take()
    }

    /// Whether the loop holding `(id, run)` still owns this job
    pub fn is_owned_by(&self, id: u64, run: u64) -> bool {
        self.id == id && self.run == run
    }

    /// Ask the running loop to stop. Flips the state to paused immediately.
    ///
    /// Returns `false` (and changes nothing) unless the job is running.
    pub fn request_cancel(&mut self) -> bool {
        if self.state != JobState::Running {
            return false;
        }
        self.cancel_requested = true;
        self.state = JobState::Paused;
        true
    }

    /// Transition paused → running for a resume and return the new run token
    ///
    /// # Errors
    ///
    /// [`Error::NothingToResume`] unless paused with text remaining.
    pub fn resume(&mut self) -> Result<u64> {
        if self.state != JobState::Paused || self.is_exhausted() {
            return Err(Error::NothingToResume);
        }
        self.cancel_requested = false;
        self.state = JobState::Running;
        self.run += 1;
        Ok(self.run)
    }

    /// First cancellation check and step selection for the loop holding `run`
    pub fn next_step(&mut self, id: u64, run: u64) -> Step {
        if !self.is_owned_by(id, run) {
            return Step::Superseded;
        }
        if self.cancel_requested || self.state != JobState::Running {
            return self.halt();
        }
        if self.is_exhausted() {
            return Step::Exhausted;
        }
        let Some(session) = self.session.clone() else {
            return Step::Superseded;
        };

        let ch = self.text[self.cursor];
        let toggle =
            self.toggle_at.contains(&self.cursor) && self.toggle_sent_at != Some(self.cursor);

        Step::Emit {
            ch,
            toggle,
            session,
        }
    }

    /// Note that the toggle for the current cursor has been sent
    pub fn mark_toggle_sent(&mut self) {
        self.toggle_sent_at = Some(self.cursor);
    }

    /// Second cancellation check, between the toggle and the character
    pub fn check_cancel(&mut self, id: u64, run: u64) -> Option<Step> {
        if !self.is_owned_by(id, run) {
            return Some(Step::Superseded);
        }
        if self.cancel_requested || self.state != JobState::Running {
            return Some(self.halt());
        }
        None
    }

    /// Advance past an emitted character. Returns `true` when exhausted.
    pub fn advance(&mut self) -> bool {
        if !self.is_exhausted() {
            self.cursor += 1;
        }
        self.is_exhausted()
    }

    /// Pause after a transport failure; the session is already gone
    pub fn pause_after_error(&mut self) {
        self.state = JobState::Paused;
        self.cancel_requested = false;
        self.session = None;
    }

    /// Read-only status
    pub fn status(&self) -> JobStatus {
        let (cursor, length) = (self.cursor, self.text.len());
        match self.state {
            JobState::Running => JobStatus::Running { cursor, length },
            JobState::Paused => JobStatus::Paused { cursor, length },
        }
    }

    fn halt(&mut self) -> Step {
        self.state = JobState::Paused;
        Step::Cancelled {
            cursor: self.cursor,
        }
    }
}
