//! The bounded-context summarization pipeline: job state machine, token
//! budget accumulator, backoff policies, artifact persistence, and observers.
//!
//! The pipeline consumes an ordered, pre-scanned sequence of chunks and
//! keeps four cooperating pieces in lockstep:
//!
//! 1. **[`accumulator`]** — [`BudgetAccumulator`] decides, per chunk, whether
//!    to append to the pending batch or trigger a flush. The threshold test
//!    runs *before* admission so each request stays under the backend's
//!    ceiling including the seed prompt and the carried summary.
//!
//! 2. **[`job`]** — [`JobRunner`] owns the state machine:
//!    accumulating → flushing → {persisting → accumulating} | {backoff →
//!    flushing}, terminal done/failed. Exactly one flush is ever in flight.
//!
//! 3. **[`persistence`]** — [`ArtifactStore`] writes each intermediate
//!    summary (tagged unfinished) and the final summary (untagged) to a
//!    single per-document path, atomically.
//!
//! 4. **[`backoff`]** — pluggable [`BackoffPolicy`] for rate-limit recovery;
//!    [`FixedDelay`] by default, [`ExponentialBackoff`] as an alternative.
//!
//! Progress flows out through the [`events::JobObserver`] trait after every
//! chunk offer, independent of flush timing.

pub mod accumulator;
pub mod backoff;
pub mod config;
pub mod events;
pub mod job;
pub mod persistence;

// Re-export commonly used items at the module level.
pub use accumulator::{BudgetAccumulator, Chunk, Decision};
pub use backoff::{BackoffPolicy, ExponentialBackoff, FixedDelay};
pub use config::PipelineConfig;
pub use events::{
    CompositeObserver, FnObserver, JobEvent, JobObserver, LoggingObserver, NoopObserver,
};
pub use job::{JobPhase, JobReport, JobRunner, JobState};
pub use persistence::{ArtifactStatus, ArtifactStore, ArtifactTag, progress};

use crate::SummaryBackend;
use crate::ingest::chunker::ChunkSource;
use crate::ingest::relevance::RelevanceFilter;

/// Run one complete summarization job over a document's text.
///
/// Chunks the text per the config, applies the relevance filter when
/// enabled, and drives the job state machine to a terminal phase. The
/// returned [`JobReport`] carries the terminal phase and the artifact path;
/// a `FAILED` report still points at the last partial artifact when one was
/// written.
pub async fn summarize_text(
    backend: &dyn SummaryBackend,
    store: &ArtifactStore,
    config: &PipelineConfig,
    doc_id: &str,
    text: &str,
) -> Result<JobReport, String> {
    let estimator = crate::TokenEstimator::with_calibration(config.chars_per_token);
    let source = ChunkSource::from_text(text, config.chunk_size_words, &estimator);

    let filter = if config.relevance_filter {
        Some(RelevanceFilter::new()?)
    } else {
        None
    };

    let mut runner = JobRunner::new(backend, store, config);
    if let Some(ref f) = filter {
        runner = runner.with_filter(f);
    }
    runner.run(doc_id, source).await
}
