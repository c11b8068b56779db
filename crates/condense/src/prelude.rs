//! Convenience re-exports for common `condense` types.
//!
//! Meant to be glob-imported when embedding the pipeline:
//!
//! ```ignore
//! use condense::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of callers: the
//! client, the pipeline config and runner, the artifact store, observers,
//! and the ingest helpers. Specialized types (raw accumulator, chunker
//! internals, embedding request types) are intentionally excluded — import
//! those from their modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    FlushResult, Message, MessageRole, OpenRouterClient, SummarizeError, SummaryBackend,
    TokenEstimator,
};

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::pipeline::{
    ArtifactStatus, ArtifactStore, ArtifactTag, BackoffPolicy, CompositeObserver,
    ExponentialBackoff, FixedDelay, FnObserver, JobEvent, JobObserver, JobPhase, JobReport,
    JobRunner, LoggingObserver, NoopObserver, PipelineConfig, progress, summarize_text,
};

// ── Ingest ──────────────────────────────────────────────────────────
pub use crate::ingest::{ChunkSource, RelevanceFilter, doc_id_for, find_documents,
    pending_documents};

// ── QA ──────────────────────────────────────────────────────────────
pub use crate::qa::{DocumentIndex, EmbeddingBackend, OllamaEmbeddings};
