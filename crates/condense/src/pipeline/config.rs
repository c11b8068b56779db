//! Configuration for a summarization pipeline job.
//!
//! [`PipelineConfig`] is a flat struct with a working [`Default`]. Builder
//! methods exist for the knobs callers routinely touch; everything else is a
//! public field for struct-update syntax:
//!
//! ```ignore
//! let config = PipelineConfig::default()
//!     .with_model("openai/gpt-4o-mini")
//!     .with_flush_threshold(40_000)
//!     .with_max_flush_retries(3);
//!
//! // Struct update for the rest:
//! let config = PipelineConfig {
//!     chunk_size_words: 30_000,
//!     ..PipelineConfig::default()
//! };
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Token budget at which the pending batch is flushed to the backend.
///
/// The threshold is a single configurable value, chosen so that seed prompt
/// + carried summary + accumulated chunks stay comfortably under the
/// backend's own request ceiling.
pub const DEFAULT_FLUSH_THRESHOLD: u32 = 40_000;

/// Default delay between rate-limited flush attempts. Sized to let a
/// per-minute token quota fully replenish before the identical request is
/// retried.
pub const DEFAULT_BACKOFF_DELAY: Duration = Duration::from_secs(60);

/// Seed prompt opening every request window.
pub const DEFAULT_SEED_PROMPT: &str = "You will receive a technical document as a sequence of \
    text chunks across multiple messages. Maintain a cumulative summary detailed enough that a \
    professional engineer could answer questions about the document from it alone. Preserve \
    fault codes, part names, and procedural steps verbatim.";

/// Notice injected ahead of the carried-over summary when a new accumulation
/// window opens mid-document.
pub const DEFAULT_CONTINUATION_NOTICE: &str = "The next message is your summary of the document \
    so far. Fold the chunks that follow it into one updated summary — integrate, deduplicate, \
    and update rather than append.";

/// Configuration for one summarization job.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model identifier for the summarization backend.
    pub model: String,
    /// Seed prompt; always the first pending message of every window.
    pub seed_prompt: String,
    /// Notice preceding the carried-over summary in continuation windows.
    pub continuation_notice: String,
    /// Token budget at which the pending batch is flushed.
    pub flush_threshold: u32,
    /// Maximum backoff-and-retry cycles per flush before the job fails.
    pub max_flush_retries: u32,
    /// Delay used by the default fixed backoff policy.
    pub backoff_delay: Duration,
    /// Maximum tokens for one summary response.
    pub max_summary_tokens: u32,
    /// Sampling temperature for summarization calls.
    pub temperature: f32,
    /// Directory holding one artifact file per document.
    pub artifacts_dir: PathBuf,
    /// Words per chunk when splitting document text.
    pub chunk_size_words: usize,
    /// Whether to reduce each chunk to fault-code / instruction sentences
    /// before accumulation.
    pub relevance_filter: bool,
    /// Calibrated chars-per-token ratio; `None` uses the default estimate.
    pub chars_per_token: Option<f64>,
    /// HTTP timeout for one summarization call.
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            seed_prompt: DEFAULT_SEED_PROMPT.to_string(),
            continuation_notice: DEFAULT_CONTINUATION_NOTICE.to_string(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_flush_retries: 3,
            backoff_delay: DEFAULT_BACKOFF_DELAY,
            max_summary_tokens: 2048,
            temperature: 0.6,
            artifacts_dir: PathBuf::from("artifacts"),
            chunk_size_words: 60_000,
            relevance_filter: true,
            chars_per_token: None,
            request_timeout: crate::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    /// Set the summarization model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the seed prompt.
    pub fn with_seed_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.seed_prompt = prompt.into();
        self
    }

    /// Set the flush threshold (in backend accounting units).
    pub fn with_flush_threshold(mut self, threshold: u32) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Set the maximum backoff-and-retry cycles per flush.
    pub fn with_max_flush_retries(mut self, retries: u32) -> Self {
        self.max_flush_retries = retries;
        self
    }

    /// Set the fixed backoff delay.
    pub fn with_backoff_delay(mut self, delay: Duration) -> Self {
        self.backoff_delay = delay;
        self
    }

    /// Set the artifacts directory.
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Set the words-per-chunk size for document splitting.
    pub fn with_chunk_size_words(mut self, words: usize) -> Self {
        self.chunk_size_words = words;
        self
    }

    /// Enable or disable the relevance filter.
    pub fn with_relevance_filter(mut self, enabled: bool) -> Self {
        self.relevance_filter = enabled;
        self
    }
}
