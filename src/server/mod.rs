//! Request Serving
//!
//! Routes caller requests to the [`JobScheduler`] and serves them over a
//! JSON-lines stream (one request object per line in, one response object
//! per line out).
//!
//! # Concurrency
//!
//! ```text
//! reader ──line──> spawn(handle) ──Response──┐
//!        ──line──> spawn(handle) ──Response──┼──mpsc──> writer task ──> out
//!        ──line──> spawn(handle) ──Response──┘
//! ```
//!
//! Every request runs on its own task, so a `STOP` can land while the
//! `TYPE_TEXT` it interrupts is still blocked. Responses are written by a
//! single task in completion order; callers correlate them by `id`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cdp_typist::input::KeyMapper;
//! use cdp_typist::scheduler::{JobScheduler, TypingRate};
//! use cdp_typist::server::{serve, Dispatcher};
//! use cdp_typist::transport::MemoryTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scheduler = JobScheduler::new(Arc::new(MemoryTransport::new()), KeyMapper::default());
//!     let dispatcher = Arc::new(Dispatcher::new(Arc::new(scheduler), TypingRate::DEFAULT));
//!     serve(dispatcher, tokio::io::stdin(), tokio::io::stdout()).await
//! }
//! ```

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::layout;
use crate::protocol::{Incoming, Request, Response};
use crate::scheduler::{JobScheduler, RunOutcome, TypingRate};
use crate::transport::TargetId;

/// Longest request line accepted
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Maps requests onto scheduler operations
pub struct Dispatcher {
    scheduler: Arc<JobScheduler>,
    default_rate: TypingRate,
    default_target: TargetId,
}

impl Dispatcher {
    /// Create a dispatcher typing at `default_rate` unless a request says otherwise
    pub fn new(scheduler: Arc<JobScheduler>, default_rate: TypingRate) -> Self {
        Self {
            scheduler,
            default_rate,
            default_target: TargetId::new(TargetId::FIRST),
        }
    }

    /// Target used by requests that name none
    pub fn with_default_target(mut self, target: TargetId) -> Self {
        self.default_target = target;
        self
    }

    /// Scheduler behind this dispatcher
    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    /// Decode and handle one request line
    pub async fn handle_line(&self, line: &str) -> Response {
        let Incoming { id, request } = Incoming::parse(line);
        let response = match request {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!("Rejected request: {}", e);
                Response::error(&e)
            }
        };
        response.with_id(id)
    }

    /// Handle one decoded request
    pub async fn handle(&self, request: Request) -> Response {
        let request = request.or_target(&self.default_target);
        debug!("{} on {}", request.kind(), request.target());

        match request {
            Request::TypeText {
                target,
                text,
                toggles,
                rate,
            } => {
                self.type_chars(&target, text.chars().collect(), toggles, rate)
                    .await
            }

            Request::TypeRaw { target, text, rate } => {
                let correction = layout::correct(&text);
                if !correction.boundaries.is_empty() {
                    debug!(
                        "Corrected layout at {} boundaries",
                        correction.boundaries.len()
                    );
                }
                self.type_chars(&target, correction.chars(), correction.boundaries, rate)
                    .await
            }

            Request::Stop { target } => {
                self.scheduler.stop(&target).await;
                Response::ok()
            }

            Request::Resume { target } => match self.scheduler.resume(&target) {
                // The resumed run reports through STATUS
                Ok(_run) => Response::ok(),
                Err(e) => Response::error(&e),
            },

            Request::Status { target } => Response::status(self.scheduler.status(&target)),

            Request::LayoutToggle { target } => {
                self.scheduler.layout_toggle_now(&target).await.into()
            }
        }
    }

    async fn type_chars(
        &self,
        target: &TargetId,
        text: Vec<char>,
        toggles: Vec<usize>,
        rate: Option<f64>,
    ) -> Response {
        let rate = match rate.map(TypingRate::new).transpose() {
            Ok(rate) => rate.unwrap_or(self.default_rate),
            Err(e) => return Response::error(&e),
        };

        match self.scheduler.start(target, text, toggles, rate).await {
            Ok(RunOutcome::Paused { cursor, length }) => {
                debug!("Typing on {} paused at {}/{}", target, cursor, length);
                Response::ok()
            }
            Ok(_) => Response::ok(),
            Err(e) => Response::error(&e),
        }
    }
}

/// Serve JSON-lines requests from `reader`, writing responses to `writer`
///
/// Returns once `reader` reaches end of input and every in-flight request
/// has been answered.
pub async fn serve<R, W>(dispatcher: Arc<Dispatcher>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

    let writer_task = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        while let Some(response) = rx.recv().await {
            if let Err(e) = sink.send(response.to_line()).await {
                warn!("Failed to write response: {}", e);
                break;
            }
        }
    });

    info!("Serving requests");

    let mut requests = JoinSet::new();
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let error = Error::MalformedRequest("line too long".to_string());
                let _ = tx.send(Response::error(&error));
                continue;
            }
            Err(LinesCodecError::Io(e)) => {
                return Err(e).context("Failed to read request");
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let dispatcher = Arc::clone(&dispatcher);
        let tx = tx.clone();
        requests.spawn(async move {
            let response = dispatcher.handle_line(&line).await;
            let _ = tx.send(response);
        });

        // Reap finished requests so the set stays small on long sessions
        while requests.try_join_next().is_some() {}
    }

    debug!("Input closed, waiting for {} in-flight requests", requests.len());
    while requests.join_next().await.is_some() {}

    drop(tx);
    writer_task.await.context("Response writer failed")?;

    info!("Request stream closed");
    Ok(())
}
