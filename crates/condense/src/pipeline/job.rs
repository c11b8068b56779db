//! The summarization job state machine.
//!
//! One [`JobRunner`] drives one document from its first chunk to a terminal
//! phase: accumulating → flushing → {persisting → accumulating} | {backoff →
//! flushing}, ending in done or failed. All mutable job state lives in one
//! [`JobState`] value owned by the runner and passed by exclusive reference —
//! never ambient, never shared.
//!
//! Exactly one flush is ever in flight. The pipeline is strictly sequential
//! within a job: no chunk is offered while a flush, backoff sleep, or
//! persist is underway. The two operations that can block for an
//! externally-imposed duration — the backend call and the backoff sleep —
//! are bracketed by stop-signal checks, so a cancellation lands between
//! them and leaves the last persisted artifact intact.

use super::accumulator::{BudgetAccumulator, Chunk, Decision};
use super::backoff::{BackoffPolicy, FixedDelay};
use super::config::PipelineConfig;
use super::events::{JobEvent, JobObserver, NoopObserver};
use super::persistence::{ArtifactStore, ArtifactTag};
use crate::ingest::chunker::ChunkSource;
use crate::ingest::relevance::RelevanceFilter;
use crate::{Message, SummaryBackend, SummarizeError, TokenEstimator};
use std::path::PathBuf;
use tracing::{info, warn};

// ── Phases ─────────────────────────────────────────────────────────

/// Where a job currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Offering chunks to the budget accumulator.
    Accumulating,
    /// One backend call in flight for the pending batch.
    Flushing,
    /// Sleeping out a rate-limit-class failure before retrying.
    Backoff,
    /// Writing the flush result to durable storage.
    Persisting,
    /// Terminal: the final artifact is persisted untagged.
    Done,
    /// Terminal: retries exhausted or a non-retryable failure. The last
    /// partial artifact, if any, remains on disk.
    Failed,
}

// ── Job state ──────────────────────────────────────────────────────

/// The mutable state of one summarization job.
#[derive(Debug)]
pub struct JobState {
    /// Ordered batch for the next flush: seed prompt first, then (in
    /// continuation windows) the notice and the carried summary, then
    /// newly accumulated chunks.
    pub pending_messages: Vec<Message>,
    /// Running token cost of `pending_messages`. Kept equal to the summed
    /// cost of the batch by construction: both only change together.
    pub token_sum: u32,
    /// Chunks consumed so far. Monotonically non-decreasing.
    pub chunks_done: usize,
    /// Known up front — the chunk source is pre-scanned.
    pub chunks_total: usize,
    /// The previous flush's output; empty until the first flush completes.
    pub carry_over_summary: String,
    pub phase: JobPhase,
    /// The most recent durable artifact, when one has been written.
    pub last_artifact: Option<PathBuf>,
}

impl JobState {
    pub fn new(seed_prompt: &str, estimator: &TokenEstimator, chunks_total: usize) -> Self {
        let seed = Message::system(seed_prompt);
        let token_sum = estimator.cost(&seed.content);
        Self {
            pending_messages: vec![seed],
            token_sum,
            chunks_done: 0,
            chunks_total,
            carry_over_summary: String::new(),
            phase: JobPhase::Accumulating,
            last_artifact: None,
        }
    }

    /// Append a chunk's message to the pending batch and account its cost.
    pub fn append_chunk(&mut self, chunk: &Chunk) {
        self.token_sum = self.token_sum.saturating_add(chunk.token_cost);
        self.pending_messages
            .push(Message::system(chunk.text.clone()));
    }

    /// Reset the batch for the next accumulation window: seed prompt,
    /// continuation notice, then the carried summary, with `token_sum`
    /// recomputed from that triple.
    pub fn open_continuation_window(
        &mut self,
        config: &PipelineConfig,
        estimator: &TokenEstimator,
    ) {
        self.pending_messages = vec![
            Message::system(config.seed_prompt.clone()),
            Message::system(config.continuation_notice.clone()),
            Message::assistant(self.carry_over_summary.clone()),
        ];
        self.token_sum = estimator.cost_of_messages(&self.pending_messages);
    }

    /// Fraction of the document consumed so far.
    pub fn progress(&self) -> f64 {
        super::persistence::progress(self.chunks_done, self.chunks_total)
    }
}

// ── Report ─────────────────────────────────────────────────────────

/// The result of a complete job run.
#[derive(Debug)]
pub struct JobReport {
    pub doc_id: String,
    /// Terminal phase: [`JobPhase::Done`] or [`JobPhase::Failed`].
    pub phase: JobPhase,
    /// Path of the last persisted artifact. On `Failed`, this is the last
    /// partial write — never silently deleted.
    pub artifact: Option<PathBuf>,
    pub chunks_done: usize,
    pub chunks_total: usize,
    /// Successful backend calls.
    pub flushes: u32,
    /// Backoff sleeps taken across all flushes.
    pub backoffs: u32,
    /// Summed token usage the backend reported, where available.
    pub backend_reported_usage: u64,
    /// Why the job failed, for `Failed` reports.
    pub failure_reason: Option<String>,
    /// Whether the terminal phase was reached via the stop signal rather
    /// than a backend failure.
    pub interrupted: bool,
}

#[derive(Debug, Default)]
struct RunStats {
    flushes: u32,
    backoffs: u32,
    backend_usage: u64,
}

/// How one flush ultimately failed.
enum FlushFailure {
    /// The stop signal fired before the flush (or after a backoff sleep).
    Interrupted,
    /// Retryable failures exceeded the per-flush retry ceiling.
    Exhausted(SummarizeError),
    /// A non-retryable backend failure.
    Fatal(SummarizeError),
    /// Artifact storage failed; the job aborts as an infrastructure error.
    Io(String),
}

// ── Runner ─────────────────────────────────────────────────────────

/// Drives one document's chunks through the accumulator, the backend, and
/// the artifact store.
///
/// ```ignore
/// let runner = JobRunner::new(&client, &store, &config)
///     .with_filter(&filter)
///     .with_observer(&LoggingObserver)
///     .with_stop_signal(|| STOP.load(Ordering::Relaxed));
///
/// let report = runner.run("manual", source).await?;
/// ```
///
/// # Lifetimes
///
/// The runner borrows the backend, store, config, filter, and observer;
/// all references must outlive the `.run()` call. Bind observers to `let`
/// bindings before building the runner.
pub struct JobRunner<'a> {
    backend: &'a dyn SummaryBackend,
    store: &'a ArtifactStore,
    config: &'a PipelineConfig,
    estimator: TokenEstimator,
    accumulator: BudgetAccumulator,
    filter: Option<&'a RelevanceFilter>,
    backoff: Box<dyn BackoffPolicy + 'a>,
    observer: &'a dyn JobObserver,
    /// Optional stop signal — checked before each flush is issued and after
    /// each backoff sleep. If it returns `true`, the job ends without
    /// touching the last persisted artifact.
    stop_signal: Option<Box<dyn Fn() -> bool + Send + Sync + 'a>>,
}

impl<'a> JobRunner<'a> {
    pub fn new(
        backend: &'a dyn SummaryBackend,
        store: &'a ArtifactStore,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            backend,
            store,
            config,
            estimator: TokenEstimator::with_calibration(config.chars_per_token),
            accumulator: BudgetAccumulator::new(config.flush_threshold),
            filter: None,
            backoff: Box::new(FixedDelay::new(config.backoff_delay)),
            observer: &NoopObserver,
            stop_signal: None,
        }
    }

    /// Reduce each chunk through a relevance filter before accumulation.
    pub fn with_filter(mut self, filter: &'a RelevanceFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Replace the backoff policy (default: fixed delay from the config).
    pub fn with_backoff(mut self, policy: impl BackoffPolicy + 'a) -> Self {
        self.backoff = Box::new(policy);
        self
    }

    /// Attach an observer for job events.
    pub fn with_observer(mut self, observer: &'a dyn JobObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Attach a stop signal. The closure is consulted before each flush and
    /// after each backoff sleep; returning `true` ends the job.
    pub fn with_stop_signal(mut self, signal: impl Fn() -> bool + Send + Sync + 'a) -> Self {
        self.stop_signal = Some(Box::new(signal));
        self
    }

    /// Run the job to a terminal phase.
    ///
    /// Returns `Ok` with a [`JobReport`] for both `Done` and `Failed`
    /// terminals — a failed document keeps its last partial artifact and
    /// the report says why. `Err` is reserved for infrastructure problems
    /// (artifact I/O) with no meaningful terminal state.
    pub async fn run(&self, doc_id: &str, mut source: ChunkSource) -> Result<JobReport, String> {
        let chunks_total = source.total();
        let mut state = JobState::new(&self.config.seed_prompt, &self.estimator, chunks_total);
        let mut stats = RunStats::default();

        info!("Summarization job started: doc={doc_id}, chunks={chunks_total}");
        self.observer.on_event(&JobEvent::JobStarted {
            doc_id,
            chunks_total,
        });

        // A zero-chunk document completes immediately with an empty final
        // artifact, so a later scan can tell "done" from "never ran".
        if chunks_total == 0 {
            let path = self.store.persist(doc_id, "", ArtifactTag::Final)?;
            self.observer.on_event(&JobEvent::ArtifactPersisted {
                path: &path,
                tag: ArtifactTag::Final,
            });
            state.last_artifact = Some(path);
            state.phase = JobPhase::Done;
            return Ok(self.finish(doc_id, state, stats, None, false));
        }

        while let Some(raw) = source.next() {
            let chunk = self.reduce(raw);
            let decision = self.accumulator.offer(&mut state, &chunk);
            self.observer.on_event(&JobEvent::Progress {
                chunks_done: state.chunks_done,
                chunks_total: state.chunks_total,
                phase: state.phase,
            });

            match decision {
                Decision::Append => {}
                Decision::FlushThenAppend => {
                    match self
                        .flush(doc_id, &mut state, ArtifactTag::Partial, &mut stats)
                        .await
                    {
                        Ok(()) => {
                            state.open_continuation_window(self.config, &self.estimator);
                            // The deferred chunk opens the new window.
                            state.append_chunk(&chunk);
                            state.phase = JobPhase::Accumulating;
                        }
                        Err(FlushFailure::Io(e)) => return Err(e),
                        Err(failure) => return Ok(self.fail(doc_id, state, stats, failure)),
                    }
                }
                Decision::FlushThenDone => {
                    match self
                        .flush(doc_id, &mut state, ArtifactTag::Final, &mut stats)
                        .await
                    {
                        Ok(()) => state.phase = JobPhase::Done,
                        Err(FlushFailure::Io(e)) => return Err(e),
                        Err(failure) => return Ok(self.fail(doc_id, state, stats, failure)),
                    }
                }
            }
        }

        // The source is pre-scanned, so the last chunk always takes the
        // forced-final path above.
        Ok(self.finish(doc_id, state, stats, None, false))
    }

    /// Apply the relevance filter to a raw chunk, recosting the residue.
    fn reduce(&self, chunk: Chunk) -> Chunk {
        match self.filter {
            Some(filter) => {
                let text = filter.reduce(&chunk.text);
                let token_cost = self.estimator.cost(&text);
                Chunk {
                    sequence_index: chunk.sequence_index,
                    text,
                    token_cost,
                }
            }
            None => chunk,
        }
    }

    fn stopped(&self) -> bool {
        self.stop_signal.as_ref().is_some_and(|signal| signal())
    }

    /// Issue one flush for the pending batch, retrying rate-limit-class
    /// failures up to the configured ceiling, then persist the result.
    async fn flush(
        &self,
        doc_id: &str,
        state: &mut JobState,
        tag: ArtifactTag,
        stats: &mut RunStats,
    ) -> Result<(), FlushFailure> {
        let mut attempt: u32 = 0;
        loop {
            if self.stopped() {
                info!("Stop signal received — ending job for {doc_id}");
                return Err(FlushFailure::Interrupted);
            }

            state.phase = JobPhase::Flushing;
            self.observer.on_event(&JobEvent::FlushStarted {
                attempt,
                message_count: state.pending_messages.len(),
                pending_tokens: state.token_sum,
            });

            match self
                .backend
                .summarize(&state.pending_messages, self.config.max_summary_tokens)
                .await
            {
                Ok(result) => {
                    stats.flushes += 1;
                    if let Some(usage) = result.backend_reported_usage {
                        stats.backend_usage += u64::from(usage);
                    }
                    self.observer.on_event(&JobEvent::FlushCompleted {
                        summary_chars: result.summary_text.len(),
                        backend_reported_usage: result.backend_reported_usage,
                    });

                    state.phase = JobPhase::Persisting;
                    state.carry_over_summary = result.summary_text;
                    let path = self
                        .store
                        .persist(doc_id, &state.carry_over_summary, tag)
                        .map_err(FlushFailure::Io)?;
                    self.observer.on_event(&JobEvent::ArtifactPersisted {
                        path: &path,
                        tag,
                    });
                    state.last_artifact = Some(path);
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    if attempt >= self.config.max_flush_retries {
                        return Err(FlushFailure::Exhausted(e));
                    }
                    state.phase = JobPhase::Backoff;
                    let delay = self.backoff.next_delay(attempt);
                    attempt += 1;
                    stats.backoffs += 1;
                    warn!(
                        "Flush for {doc_id} hit a retryable failure ({e}); \
                         retry {attempt} in {:.0}s",
                        delay.as_secs_f64()
                    );
                    self.observer
                        .on_event(&JobEvent::BackoffStarted { attempt, delay });
                    tokio::time::sleep(delay).await;
                    // The stop signal is re-checked at the top of the loop
                    // before the retry goes out.
                }
                Err(e) => return Err(FlushFailure::Fatal(e)),
            }
        }
    }

    fn fail(
        &self,
        doc_id: &str,
        mut state: JobState,
        stats: RunStats,
        failure: FlushFailure,
    ) -> JobReport {
        state.phase = JobPhase::Failed;
        let (reason, interrupted) = match failure {
            FlushFailure::Interrupted => ("stop signal".to_string(), true),
            FlushFailure::Exhausted(e) => (format!("retries exhausted: {e}"), false),
            FlushFailure::Fatal(e) => (e.to_string(), false),
            FlushFailure::Io(e) => (e, false),
        };
        warn!("Summarization job failed: doc={doc_id}, {reason}");
        self.finish(doc_id, state, stats, Some(reason), interrupted)
    }

    fn finish(
        &self,
        doc_id: &str,
        state: JobState,
        stats: RunStats,
        failure_reason: Option<String>,
        interrupted: bool,
    ) -> JobReport {
        self.observer.on_event(&JobEvent::JobFinished {
            phase: state.phase,
            chunks_done: state.chunks_done,
            chunks_total: state.chunks_total,
        });
        info!(
            "Summarization job finished: doc={doc_id}, phase={:?}, \
             flushes={}, backoffs={}",
            state.phase, stats.flushes, stats.backoffs
        );
        JobReport {
            doc_id: doc_id.to_string(),
            phase: state.phase,
            artifact: state.last_artifact,
            chunks_done: state.chunks_done,
            chunks_total: state.chunks_total,
            flushes: stats.flushes,
            backoffs: stats.backoffs,
            backend_reported_usage: stats.backend_usage,
            failure_reason,
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_holds_only_the_seed() {
        let est = TokenEstimator::default();
        let state = JobState::new(&"x".repeat(35), &est, 5);
        assert_eq!(state.pending_messages.len(), 1);
        assert_eq!(state.token_sum, 10);
        assert_eq!(state.chunks_done, 0);
        assert_eq!(state.phase, JobPhase::Accumulating);
        assert!(state.carry_over_summary.is_empty());
    }

    #[test]
    fn continuation_window_recomputes_token_sum() {
        let est = TokenEstimator::default();
        let config = PipelineConfig::default();
        let mut state = JobState::new(&config.seed_prompt, &est, 5);

        state.append_chunk(&Chunk::new(0, "some chunk text", 100));
        state.carry_over_summary = "summary so far".to_string();
        state.open_continuation_window(&config, &est);

        assert_eq!(state.pending_messages.len(), 3);
        assert_eq!(state.pending_messages[0].content, config.seed_prompt);
        assert_eq!(
            state.pending_messages[1].content,
            config.continuation_notice
        );
        assert_eq!(state.pending_messages[2].content, "summary so far");
        assert_eq!(
            state.pending_messages[2].role,
            crate::MessageRole::Assistant
        );
        assert_eq!(
            state.token_sum,
            est.cost_of_messages(&state.pending_messages)
        );
    }

    #[test]
    fn append_chunk_tracks_cost() {
        let est = TokenEstimator::default();
        let mut state = JobState::new("seed", &est, 2);
        let before = state.token_sum;
        state.append_chunk(&Chunk::new(0, "text", 40));
        assert_eq!(state.token_sum, before + 40);
        assert_eq!(state.pending_messages.len(), 2);
    }

    #[test]
    fn state_progress_fraction() {
        let est = TokenEstimator::default();
        let mut state = JobState::new("seed", &est, 4);
        assert_eq!(state.progress(), 0.0);
        state.chunks_done = 3;
        assert_eq!(state.progress(), 0.75);
    }
}
