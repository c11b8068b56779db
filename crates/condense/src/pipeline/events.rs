//! Events and observers for the job state machine.
//!
//! The pipeline communicates with callers through [`JobEvent`] variants
//! covering the full job lifecycle — a progress update after every chunk
//! offer, each flush attempt, each backoff sleep, each artifact write, and
//! the terminal phase. Callers implement [`JobObserver`] to react for
//! logging, UI rendering, or metrics; the pipeline itself has no opinion
//! about transport.
//!
//! | Observer | Use case |
//! |----------|----------|
//! | [`NoopObserver`] | Tests or fire-and-forget runs |
//! | [`LoggingObserver`] | Structured logging via `tracing` |
//! | [`FnObserver`] | Quick closures for simple callbacks |
//! | [`CompositeObserver`] | Compose multiple observers in order |

use super::job::JobPhase;
use super::persistence::ArtifactTag;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Events emitted while a job runs.
#[derive(Debug)]
pub enum JobEvent<'a> {
    /// A job is starting; the chunk count is known up front.
    JobStarted { doc_id: &'a str, chunks_total: usize },
    /// Emitted after every chunk offer, independent of flush timing.
    Progress {
        chunks_done: usize,
        chunks_total: usize,
        phase: JobPhase,
    },
    /// A flush attempt is being issued to the backend.
    FlushStarted {
        /// 0 for the first attempt, incremented per retry of this flush.
        attempt: u32,
        message_count: usize,
        pending_tokens: u32,
    },
    /// The backend returned a summary.
    FlushCompleted {
        summary_chars: usize,
        backend_reported_usage: Option<u32>,
    },
    /// A rate-limit-class failure: sleeping before retrying the identical
    /// request.
    BackoffStarted { attempt: u32, delay: Duration },
    /// An artifact was written to durable storage.
    ArtifactPersisted { path: &'a Path, tag: ArtifactTag },
    /// The job reached a terminal phase.
    JobFinished {
        phase: JobPhase,
        chunks_done: usize,
        chunks_total: usize,
    },
}

/// Observer for job events.
///
/// All events are informational — observers cannot steer the pipeline. The
/// default implementation ignores everything.
pub trait JobObserver: Send + Sync {
    fn on_event(&self, event: &JobEvent<'_>) {
        let _ = event;
    }
}

/// An observer that ignores all events.
pub struct NoopObserver;
impl JobObserver for NoopObserver {}

/// An observer backed by a closure.
///
/// ```ignore
/// let observer = FnObserver::new(|event| {
///     if let JobEvent::Progress { chunks_done, chunks_total, .. } = event {
///         println!("{chunks_done}/{chunks_total}");
///     }
/// });
/// ```
pub struct FnObserver<F>(F)
where
    F: Fn(&JobEvent<'_>) + Send + Sync;

impl<F> FnObserver<F>
where
    F: Fn(&JobEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> JobObserver for FnObserver<F>
where
    F: Fn(&JobEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &JobEvent<'_>) {
        (self.0)(event)
    }
}

/// An observer that delegates to multiple inner observers in order.
pub struct CompositeObserver {
    observers: Vec<Box<dyn JobObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Add an observer. Observers are called in registration order.
    pub fn with(mut self, observer: impl JobObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Conditionally add an observer. When `condition` is `false`, this is
    /// a no-op — keeps the builder chain intact.
    pub fn with_if(self, condition: bool, observer: impl JobObserver + 'static) -> Self {
        if condition { self.with(observer) } else { self }
    }
}

impl Default for CompositeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl JobObserver for CompositeObserver {
    fn on_event(&self, event: &JobEvent<'_>) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// An observer that logs events via `tracing`.
pub struct LoggingObserver;

impl JobObserver for LoggingObserver {
    fn on_event(&self, event: &JobEvent<'_>) {
        match event {
            JobEvent::JobStarted {
                doc_id,
                chunks_total,
            } => {
                info!("[{doc_id}] job started: {chunks_total} chunk(s)");
            }
            JobEvent::Progress {
                chunks_done,
                chunks_total,
                phase,
            } => {
                debug!(
                    "progress: {chunks_done}/{chunks_total} ({:.0}%), phase={phase:?}",
                    super::persistence::progress(*chunks_done, *chunks_total) * 100.0
                );
            }
            JobEvent::FlushStarted {
                attempt,
                message_count,
                pending_tokens,
            } => {
                if *attempt == 0 {
                    info!("flush: {message_count} message(s), ~{pending_tokens} tokens");
                } else {
                    info!(
                        "flush retry {attempt}: {message_count} message(s), \
                         ~{pending_tokens} tokens"
                    );
                }
            }
            JobEvent::FlushCompleted {
                summary_chars,
                backend_reported_usage,
            } => {
                debug!(
                    "flush completed: {summary_chars} chars, backend usage {}",
                    backend_reported_usage
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| "unreported".to_string()),
                );
            }
            JobEvent::BackoffStarted { attempt, delay } => {
                warn!(
                    "rate limited — backing off {:.0}s before retry {attempt}",
                    delay.as_secs_f64()
                );
            }
            JobEvent::ArtifactPersisted { path, tag } => {
                debug!("persisted {tag:?} artifact: {}", path.display());
            }
            JobEvent::JobFinished {
                phase,
                chunks_done,
                chunks_total,
            } => {
                info!("job finished: {phase:?} ({chunks_done}/{chunks_total} chunks)");
            }
        }
    }
}
