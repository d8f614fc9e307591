//! Job Scheduler
//!
//! Owns at most one [`Job`] per target and steps it character by character
//! through the keymap and sequencer, pacing output at the job's rate.
//!
//! # Locking
//!
//! Each target gets a [`TargetSlot`] with two locks:
//!
//! - `job` (`parking_lot::Mutex`) guards the run record. Control calls and
//!   the execution loop both take it, only for short critical sections and
//!   never across an `.await`.
//! - `run_lock` (`tokio::sync::Mutex`) is held by whichever execution loop
//!   is advancing the cursor, for the whole run. `start`, a resumed run and
//!   a one-shot layout toggle queue on it, so two loops never emit on the
//!   same target at once.
//!
//! `start` swaps its job into the slot before queueing on `run_lock`, so a
//! stop issued while an older loop winds down reaches the new job. Control
//! calls never wait on `run_lock`: sessions taken from a replaced or
//! cleared job are parked in `retired` and closed by whoever releases
//! `run_lock` next, or right away when nobody holds it.
//!
//! A loop re-validates ownership (job id + run token) every time it takes
//! the `job` lock; a start that replaced the job, or a resume that issued a
//! new run token, makes the old loop exit at its next check.
//!
//! # Suspension points
//!
//! A loop only yields at event sends and at the pacing sleep. Cancellation
//! is checked before the optional layout toggle and again right after it,
//! so at most one character's events are in flight when a stop lands. The
//! pacing sleep is cut short by `wake`, which every stop and replacing
//! start signals.

pub mod job;

pub use job::{Job, JobState, JobStatus, Step, TypingRate};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MutexGuard, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::input::{emit, emit_layout_toggle, KeyMapper};
use crate::transport::{Session, TargetId, Transport};

/// How an execution loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every character was emitted; the job is gone
    Completed {
        /// Characters typed in total
        length: usize,
    },
    /// A stop request paused the job
    Paused {
        /// Index of the next character
        cursor: usize,
        /// Total characters
        length: usize,
    },
    /// A newer start or resume took over the job
    Superseded,
}

/// Effect of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No job existed
    Idle,
    /// Running job asked to pause
    Pausing {
        /// Cursor at the moment of the request
        cursor: usize,
    },
    /// Paused job discarded
    Cleared,
}

/// Per-target record and run serialization
#[derive(Default)]
struct TargetSlot {
    job: Mutex<Option<Job>>,
    retired: Mutex<Vec<Session>>,
    run_lock: tokio::sync::Mutex<()>,
    wake: Notify,
}

impl TargetSlot {
    fn is_running(&self) -> bool {
        self.job
            .lock()
            .as_ref()
            .map_or(false, |job| job.state() == JobState::Running)
    }

    fn is_vacant(&self) -> bool {
        self.job.lock().is_none() && self.retired.lock().is_empty()
    }

    /// Park `session` until no loop can still be sending through it
    async fn retire(&self, transport: &dyn Transport, session: Session) {
        self.retired.lock().push(session);
        // A current holder of `run_lock` closes it on release instead
        let idle = self.run_lock.try_lock().is_ok();
        if idle {
            self.close_retired(transport).await;
        }
    }

    /// Let go of `run_lock`, then close whatever was retired meanwhile
    async fn release(&self, transport: &dyn Transport, run: MutexGuard<'_, ()>) {
        drop(run);
        self.close_retired(transport).await;
    }

    async fn close_retired(&self, transport: &dyn Transport) {
        let sessions = std::mem::take(&mut *self.retired.lock());
        for session in sessions {
            debug!("Closing retired session {}", session.id);
            transport.detach(&session).await;
        }
    }
}

type SlotMap = Mutex<HashMap<TargetId, Arc<TargetSlot>>>;

/// Per-target typing job service
pub struct JobScheduler {
    transport: Arc<dyn Transport>,
    mapper: KeyMapper,
    slots: Arc<SlotMap>,
    next_job_id: AtomicU64,
}

impl JobScheduler {
    /// Create a scheduler over `transport`
    pub fn new(transport: Arc<dyn Transport>, mapper: KeyMapper) -> Self {
        info!("Job scheduler using {} transport", transport.name());
        Self {
            transport,
            mapper,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_job_id: AtomicU64::new(1),
        }
    }

    /// Start typing `text` on `target`, replacing any existing job
    ///
    /// Resolves once the job completes or pauses.
    ///
    /// # Errors
    ///
    /// Attach failures discard the new job. A transport failure mid-stream
    /// pauses the job (cursor preserved) unless nothing had been typed yet,
    /// in which case the job is discarded. Either way the error is returned.
    pub async fn start(
        &self,
        target: &TargetId,
        text: Vec<char>,
        toggles: Vec<usize>,
        rate: TypingRate,
    ) -> Result<RunOutcome> {
        let slot = self.slot(target);

        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let job = Job::new(id, text, toggles, rate);
        let (length, run, empty) = (job.len(), job.run(), job.is_empty());

        let previous = slot.job.lock().replace(job);
        if let Some(mut old) = previous {
            info!("Replacing {:?} job on {}", old.state(), target);
            slot.wake.notify_waiters();
            if let Some(session) = old.take_session() {
                slot.retire(self.transport.as_ref(), session).await;
            }
        }

        info!(
            "Typing {} characters on {} at {:.1} chars/s",
            length,
            target,
            rate.get()
        );

        let outcome = if empty {
            remove_if(&slot, |job| job.id() == id);
            Ok(RunOutcome::Completed { length })
        } else {
            let guard = slot.run_lock.lock().await;
            let outcome = self
                .runner(target, Arc::clone(&slot))
                .launch(id, run, length)
                .await;
            slot.release(self.transport.as_ref(), guard).await;
            outcome
        };

        prune(&self.slots, target, slot);
        outcome
    }

    /// Pause a running job, or discard a paused one
    pub async fn stop(&self, target: &TargetId) -> StopOutcome {
        let Some(slot) = self.existing_slot(target) else {
            return StopOutcome::Idle;
        };

        let (outcome, cleared) = {
            let mut guard = slot.job.lock();
            let cancelled = guard.as_mut().map(Job::request_cancel);
            match cancelled {
                None => (StopOutcome::Idle, None),
                Some(true) => {
                    let cursor = guard.as_ref().map_or(0, Job::cursor);
                    (StopOutcome::Pausing { cursor }, None)
                }
                Some(false) => (StopOutcome::Cleared, guard.take()),
            }
        };

        match outcome {
            StopOutcome::Pausing { cursor } => {
                info!("Pause requested on {} at cursor {}", target, cursor)
            }
            StopOutcome::Cleared => info!("Cleared paused job on {}", target),
            StopOutcome::Idle => debug!("Stop on idle target {}", target),
        }

        if outcome != StopOutcome::Idle {
            slot.wake.notify_waiters();
        }
        if let Some(session) = cleared.and_then(|mut job| job.take_session()) {
            slot.retire(self.transport.as_ref(), session).await;
        }

        prune(&self.slots, target, slot);
        outcome
    }

    /// Resume a paused job in the background
    ///
    /// Returns as soon as the job is marked running; the handle resolves
    /// when the resumed run completes or pauses again.
    ///
    /// # Errors
    ///
    /// [`Error::NothingToResume`] unless a paused job with text left exists.
    pub fn resume(&self, target: &TargetId) -> Result<JoinHandle<Result<RunOutcome>>> {
        let slot = self.existing_slot(target).ok_or(Error::NothingToResume)?;

        let (id, run, length) = {
            let mut guard = slot.job.lock();
            let job = guard.as_mut().ok_or(Error::NothingToResume)?;
            let run = job.resume()?;
            (job.id(), run, job.len())
        };

        info!("Resuming job on {}", target);
        let runner = self.runner(target, slot);
        Ok(tokio::spawn(async move { runner.resume(id, run, length).await }))
    }

    /// Current status of `target`
    pub fn status(&self, target: &TargetId) -> JobStatus {
        self.existing_slot(target)
            .and_then(|slot| slot.job.lock().as_ref().map(Job::status))
            .unwrap_or(JobStatus::Idle)
    }

    /// Send the layout toggle once, outside of any job
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] while a job is running (or a loop is still winding
    /// down) on `target`; transport errors otherwise.
    pub async fn layout_toggle_now(&self, target: &TargetId) -> Result<()> {
        let slot = self.slot(target);

        let result = match slot.run_lock.try_lock() {
            Ok(guard) if !slot.is_running() => {
                let result = self.send_toggle(target).await;
                slot.release(self.transport.as_ref(), guard).await;
                result
            }
            _ => Err(Error::Busy),
        };

        prune(&self.slots, target, slot);
        result
    }

    async fn send_toggle(&self, target: &TargetId) -> Result<()> {
        let session = self.transport.attach(target).await?;
        let result =
            emit_layout_toggle(self.transport.as_ref(), &session, self.mapper.dialect()).await;
        self.transport.detach(&session).await;

        if result.is_ok() {
            debug!("Layout toggle sent to {}", target);
        }
        result
    }

    fn slot(&self, target: &TargetId) -> Arc<TargetSlot> {
        self.slots
            .lock()
            .entry(target.clone())
            .or_default()
            .clone()
    }

    fn existing_slot(&self, target: &TargetId) -> Option<Arc<TargetSlot>> {
        self.slots.lock().get(target).cloned()
    }

    fn runner(&self, target: &TargetId, slot: Arc<TargetSlot>) -> Runner {
        Runner {
            transport: Arc::clone(&self.transport),
            mapper: self.mapper,
            slots: Arc::clone(&self.slots),
            target: target.clone(),
            slot,
        }
    }
}

fn remove_if(slot: &TargetSlot, owned: impl FnOnce(&Job) -> bool) -> Option<Job> {
    let mut guard = slot.job.lock();
    if guard.as_ref().map_or(false, owned) {
        guard.take()
    } else {
        None
    }
}

/// Forget `target`'s slot once it holds nothing and `slot` is its last user
fn prune(slots: &SlotMap, target: &TargetId, slot: Arc<TargetSlot>) {
    let mut map = slots.lock();
    // One reference in the map, one in `slot`
    if Arc::strong_count(&slot) > 2 || !slot.is_vacant() {
        return;
    }
    if map.get(target).map_or(false, |kept| Arc::ptr_eq(kept, &slot)) {
        map.remove(target);
        debug!("Dropped idle slot for {}", target);
    }
}

/// Result of advancing the cursor past one character
enum Advance {
    Next(Option<Duration>),
    Done(Option<Session>),
    Gone,
}

/// Everything an execution loop needs, detachable from the scheduler
struct Runner {
    transport: Arc<dyn Transport>,
    mapper: KeyMapper,
    slots: Arc<SlotMap>,
    target: TargetId,
    slot: Arc<TargetSlot>,
}

impl Runner {
    /// First run of a freshly started job. The caller holds `run_lock`.
    async fn launch(&self, id: u64, run: u64, length: usize) -> Result<RunOutcome> {
        // A stop or replacement may have landed while this start queued
        let halted = self
            .slot
            .job
            .lock()
            .as_mut()
            .map_or(Some(Step::Superseded), |job| job.check_cancel(id, run));
        match halted {
            Some(Step::Cancelled { cursor }) => return Ok(self.paused(cursor, length)),
            Some(_) => return Ok(RunOutcome::Superseded),
            None => {}
        }

        let session = match self.transport.attach(&self.target).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Attach to {} failed, discarding job: {}", self.target, e);
                remove_if(&self.slot, |job| job.is_owned_by(id, run));
                return Err(e);
            }
        };
        if !self.store_session(id, run, &session) {
            self.transport.detach(&session).await;
            return Ok(RunOutcome::Superseded);
        }

        self.drive(id, run, length, true).await
    }

    async fn resume(self, id: u64, run: u64, length: usize) -> Result<RunOutcome> {
        let guard = self.slot.run_lock.lock().await;
        let outcome = self.reattach_and_drive(id, run, length).await;
        self.slot.release(self.transport.as_ref(), guard).await;

        if let Err(e) = &outcome {
            warn!("Resumed job on {} failed: {}", self.target, e);
        }
        let Runner {
            slots,
            target,
            slot,
            ..
        } = self;
        prune(&slots, &target, slot);
        outcome
    }

    async fn reattach_and_drive(&self, id: u64, run: u64, length: usize) -> Result<RunOutcome> {
        let needs_session = {
            let guard = self.slot.job.lock();
            guard
                .as_ref()
                .filter(|job| job.is_owned_by(id, run))
                .map(|job| !job.session_open())
        };

        match needs_session {
            None => return Ok(RunOutcome::Superseded),
            Some(false) => {}
            Some(true) => match self.transport.attach(&self.target).await {
                Ok(session) => {
                    if !self.store_session(id, run, &session) {
                        self.transport.detach(&session).await;
                        return Ok(RunOutcome::Superseded);
                    }
                }
                Err(e) => {
                    warn!("Re-attach to {} failed: {}", self.target, e);
                    if let Some(job) = self.slot.job.lock().as_mut() {
                        if job.is_owned_by(id, run) {
                            job.pause_after_error();
                        }
                    }
                    return Err(e);
                }
            },
        }

        self.drive(id, run, length, false).await
    }

    /// Hand `session` to the job if the loop holding `(id, run)` still owns it
    fn store_session(&self, id: u64, run: u64, session: &Session) -> bool {
        let mut guard = self.slot.job.lock();
        match guard.as_mut() {
            Some(job) if job.is_owned_by(id, run) => {
                job.set_session(session.clone());
                true
            }
            _ => false,
        }
    }

    /// Execution loop. The caller holds `run_lock`.
    async fn drive(&self, id: u64, run: u64, length: usize, fresh: bool) -> Result<RunOutcome> {
        let dialect = self.mapper.dialect();

        loop {
            let step = self
                .slot
                .job
                .lock()
                .as_mut()
                .map_or(Step::Superseded, |job| job.next_step(id, run));

            let (ch, toggle, session) = match step {
                Step::Emit {
                    ch,
                    toggle,
                    session,
                } => (ch, toggle, session),
                Step::Cancelled { cursor } => return Ok(self.paused(cursor, length)),
                Step::Exhausted => {
                    let session = remove_if(&self.slot, |job| job.id() == id)
                        .and_then(|mut job| job.take_session());
                    return Ok(self.completed(session, length).await);
                }
                Step::Superseded => {
                    debug!("Loop on {} superseded", self.target);
                    return Ok(RunOutcome::Superseded);
                }
            };

            if toggle {
                if let Err(e) = emit_layout_toggle(self.transport.as_ref(), &session, dialect).await {
                    return Err(self.fail(id, run, fresh, e).await);
                }

                let halted = {
                    let mut guard = self.slot.job.lock();
                    match guard.as_mut() {
                        Some(job) if job.id() == id => {
                            job.mark_toggle_sent();
                            job.check_cancel(id, run)
                        }
                        _ => Some(Step::Superseded),
                    }
                };
                match halted {
                    Some(Step::Cancelled { cursor }) => return Ok(self.paused(cursor, length)),
                    Some(_) => return Ok(RunOutcome::Superseded),
                    None => {}
                }
            }

            let meta = self.mapper.map_char(ch);
            debug!(
                "Emitting {:?} on {} (code={:?}, shift={})",
                ch, self.target, meta.code, meta.requires_shift
            );
            if let Err(e) = emit(self.transport.as_ref(), &session, &meta, dialect).await {
                return Err(self.fail(id, run, fresh, e).await);
            }

            // Registered before the state is read so no stop slips between
            let wake = self.slot.wake.notified();

            // The character went out, so the cursor moves even if a stop
            // or resume arrived meanwhile
            let advance = {
                let mut guard = self.slot.job.lock();
                let advanced = match guard.as_mut() {
                    Some(job) if job.id() == id => {
                        let halted = job.cancel_requested() || !job.is_owned_by(id, run);
                        Some((job.advance(), job.rate().delay().filter(|_| !halted)))
                    }
                    _ => None,
                };
                match advanced {
                    None => Advance::Gone,
                    Some((true, _)) => Advance::Done(guard.take().and_then(|mut job| job.take_session())),
                    Some((false, delay)) => Advance::Next(delay),
                }
            };

            match advance {
                Advance::Gone => return Ok(RunOutcome::Superseded),
                Advance::Done(session) => return Ok(self.completed(session, length).await),
                Advance::Next(Some(delay)) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wake => debug!("Pacing on {} cut short", self.target),
                    }
                }
                Advance::Next(None) => {}
            }
        }
    }

    fn paused(&self, cursor: usize, length: usize) -> RunOutcome {
        info!("Job on {} paused at {}/{}", self.target, cursor, length);
        RunOutcome::Paused { cursor, length }
    }

    async fn completed(&self, session: Option<Session>, length: usize) -> RunOutcome {
        if let Some(session) = session {
            self.transport.detach(&session).await;
        }
        info!("Job on {} completed ({} characters)", self.target, length);
        RunOutcome::Completed { length }
    }

    /// Close the session and pause or discard the job after a send failure
    async fn fail(&self, id: u64, run: u64, fresh: bool, error: Error) -> Error {
        let (session, discarded) = {
            let mut guard = self.slot.job.lock();
            let discard = match guard.as_ref() {
                Some(job) if job.is_owned_by(id, run) => {
                    Some(!error.is_recoverable() || (fresh && job.cursor() == 0))
                }
                _ => None,
            };
            match discard {
                None => (None, false),
                Some(true) => (guard.take().and_then(|mut job| job.take_session()), true),
                Some(false) => {
                    let session = guard.as_mut().and_then(Job::take_session);
                    if let Some(job) = guard.as_mut() {
                        job.pause_after_error();
                    }
                    (session, false)
                }
            }
        };

        if let Some(session) = session {
            self.transport.detach(&session).await;
        }

        if discarded {
            warn!("Job on {} discarded after error: {}", self.target, error);
        } else {
            warn!("Job on {} paused after error: {}", self.target, error);
        }
        error
    }
}
