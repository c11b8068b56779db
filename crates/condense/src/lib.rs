//! Bounded-context incremental summarization for long documents.
//!
//! `condense` turns one long source document into one cumulative summary
//! while staying under a summarization backend's rate and size limits. The
//! core abstraction is the [`JobRunner`](pipeline::job::JobRunner) — a
//! strictly sequential pipeline that batches text chunks up to a token
//! budget, flushes each batch to the backend, carries the running summary
//! forward into the next batch, and persists every intermediate result so a
//! crash or interruption never loses completed work.
//!
//! # Getting started
//!
//! Add `condense` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! condense = { path = "../condense" }
//! ```
//!
//! Then run a summarization job:
//!
//! ```ignore
//! use condense::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let config = PipelineConfig::default()
//!         .with_model("openai/gpt-4o-mini")
//!         .with_flush_threshold(40_000);
//!
//!     let client = OpenRouterClient::new(api_key)?
//!         .with_model(&config.model)
//!         .with_temperature(config.temperature);
//!     let store = ArtifactStore::new(&config.artifacts_dir)
//!         .map_err(|e| format!("failed to create artifacts dir: {e}"))?;
//!
//!     let text = std::fs::read_to_string("manual.txt")
//!         .map_err(|e| format!("failed to read document: {e}"))?;
//!     let report = summarize_text(&client, &store, &config, "manual", &text).await?;
//!
//!     println!("{}: {:?}", report.doc_id, report.phase);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! If you're looking for how to...
//!
//! - **Run the pipeline:** see [`JobRunner`](pipeline::job::JobRunner) and
//!   [`PipelineConfig`](pipeline::config::PipelineConfig), or the
//!   [`summarize_text`](pipeline::summarize_text) convenience wrapper.
//! - **Observe a job:** implement [`JobObserver`](pipeline::events::JobObserver)
//!   to react to progress, backoff, and persistence events. Use
//!   [`LoggingObserver`](pipeline::events::LoggingObserver) for tracing-based
//!   logging or [`CompositeObserver`](pipeline::events::CompositeObserver) to
//!   compose observers.
//! - **Swap the backend:** implement [`SummaryBackend`] — the pipeline only
//!   ever sees the trait. [`OpenRouterClient`] is the stock implementation.
//! - **Tune rate-limit behavior:** see
//!   [`BackoffPolicy`](pipeline::backoff::BackoffPolicy) with the stock
//!   [`FixedDelay`](pipeline::backoff::FixedDelay) and
//!   [`ExponentialBackoff`](pipeline::backoff::ExponentialBackoff) policies.
//! - **Prepare input:** see [`ingest`] for word chunking, stopword
//!   stripping, the relevance filter, and document discovery.
//! - **Query indexed documents:** see [`qa`] for the embedding-based
//!   retrieval path — a separate, much simpler read path than the pipeline.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Job state machine, token budget accumulator, backoff policies, artifact persistence, observers |
//! | [`ingest`] | Chunking, stopword stripping, relevance filtering, document discovery |
//! | [`qa`] | Embedding index + cosine ranking + question answering |
//!
//! # Design principles
//!
//! 1. **The budget is checked before admission, never after.** A chunk that
//!    would push the pending batch past the flush threshold triggers a flush
//!    of what's already accumulated; the chunk itself opens the next window.
//!    Each request stays comfortably under the backend's hard ceiling.
//!
//! 2. **Partial progress is durable.** Every intermediate summary is written
//!    to the document's artifact path (tagged unfinished) before the next
//!    batch begins. A crash mid-document costs at most one batch.
//!
//! 3. **One flush in flight.** Within a job the pipeline is strictly
//!    sequential: no chunk is offered while a flush, backoff, or persist is
//!    underway. Jobs for *different* documents may run concurrently — they
//!    own disjoint artifact paths.
//!
//! 4. **Observability over magic.** The [`JobObserver`](pipeline::events::JobObserver)
//!    trait surfaces every decision the pipeline makes: progress after every
//!    chunk, each backoff sleep, each artifact write.

pub mod ingest;
pub mod pipeline;
pub mod prelude;
pub mod qa;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::debug;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for summarization calls.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Default HTTP timeout for one summarization call. Expiry is treated as a
/// rate-limit-class failure (retry after backoff), not a fatal error.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in a summarization request.
///
/// The pipeline only ever sends two roles: `System` for the seed prompt,
/// the continuation notice, and raw chunk text; `Assistant` for the
/// carried-over summary from the previous batch.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One unit of context sent to the summarizer. Order within a request is
/// semantically significant: seed prompt first, carried-over summary next,
/// then newly accumulated chunks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Request / response types ───────────────────────────────────────

/// Chat completion request body. Only the fields this pipeline uses —
/// unused optional fields are omitted from serialization.
#[derive(Serialize, Debug)]
pub struct SummaryRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Token usage statistics reported by the backend.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// The outcome of one successful summarization call. Ephemeral: consumed
/// immediately to update the carry-over summary and reset the pending batch.
#[derive(Debug, Clone)]
pub struct FlushResult {
    /// The cumulative summary text returned by the backend.
    pub summary_text: String,
    /// Total tokens the backend reported for the call, when available.
    pub backend_reported_usage: Option<u32>,
}

// ── Failure taxonomy ───────────────────────────────────────────────

/// How one summarization call failed.
///
/// The pipeline branches on retryability: [`RateLimited`](Self::RateLimited)
/// and [`Timeout`](Self::Timeout) trigger a bounded backoff-and-retry of the
/// identical request; [`Unavailable`](Self::Unavailable) and
/// [`InvalidRequest`](Self::InvalidRequest) abort the job, leaving the last
/// persisted artifact on disk as the recoverable result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizeError {
    /// The backend rejected the call for quota reasons (HTTP 429).
    RateLimited(String),
    /// The call did not complete within the request timeout.
    Timeout(String),
    /// The backend or the network path to it is down (5xx, connection
    /// failures).
    Unavailable(String),
    /// The request itself was rejected (4xx other than 429) — retrying the
    /// identical payload cannot succeed.
    InvalidRequest(String),
}

impl SummarizeError {
    /// Whether the pipeline should back off and retry the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SummarizeError::RateLimited(_) | SummarizeError::Timeout(_)
        )
    }

    /// The detail text carried by the variant.
    pub fn detail(&self) -> &str {
        match self {
            SummarizeError::RateLimited(s)
            | SummarizeError::Timeout(s)
            | SummarizeError::Unavailable(s)
            | SummarizeError::InvalidRequest(s) => s,
        }
    }
}

impl std::fmt::Display for SummarizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummarizeError::RateLimited(s) => write!(f, "rate limited: {s}"),
            SummarizeError::Timeout(s) => write!(f, "timed out: {s}"),
            SummarizeError::Unavailable(s) => write!(f, "backend unavailable: {s}"),
            SummarizeError::InvalidRequest(s) => write!(f, "invalid request: {s}"),
        }
    }
}

/// Classify an HTTP error status into the failure taxonomy.
///
/// 429 and 408 are quota/timing failures worth retrying; other 4xx statuses
/// mean the request itself is bad; everything else (5xx and unknowns) is an
/// availability problem.
pub fn classify_status(status: u16, body: &str) -> SummarizeError {
    let detail = format!("HTTP {status}: {body}");
    match status {
        429 => SummarizeError::RateLimited(detail),
        408 => SummarizeError::Timeout(detail),
        400..=499 => SummarizeError::InvalidRequest(detail),
        _ => SummarizeError::Unavailable(detail),
    }
}

// ── Backend seam ───────────────────────────────────────────────────

/// Boxed future returned by [`SummaryBackend::summarize`].
///
/// Type alias to keep trait signatures and implementations readable.
pub type SummarizeFuture<'a> = Pin<Box<dyn Future<Output = Result<FlushResult, SummarizeError>> + Send + 'a>>;

/// The summarization backend as the pipeline sees it: one synchronous call
/// mapping an ordered message sequence to a completion.
///
/// [`OpenRouterClient`] is the stock implementation; tests substitute
/// scripted fakes to exercise the failure taxonomy.
pub trait SummaryBackend: Send + Sync {
    fn summarize<'a>(&'a self, messages: &'a [Message], max_output_tokens: u32)
    -> SummarizeFuture<'a>;
}

// ── Token estimation ───────────────────────────────────────────────

/// Deterministic text-to-token cost estimate, in the same accounting unit
/// the backend enforces its quota in.
///
/// Estimates from character counts with a calibratable chars-per-token
/// ratio. Pass `None` to [`with_calibration`](Self::with_calibration) for
/// the default ratio.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl TokenEstimator {
    /// Create an estimator with a calibrated chars-per-token ratio from
    /// historical usage data. Pass `None` to use the default.
    pub fn with_calibration(calibrated_cpt: Option<f64>) -> Self {
        Self {
            chars_per_token: calibrated_cpt.unwrap_or(DEFAULT_CHARS_PER_TOKEN),
        }
    }

    /// Estimated token cost of a piece of text.
    pub fn cost(&self, text: &str) -> u32 {
        (text.len() as f64 / self.chars_per_token) as u32
    }

    /// Summed cost of a message sequence.
    pub fn cost_of_messages(&self, messages: &[Message]) -> u32 {
        messages.iter().map(|m| self.cost(&m.content)).sum()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::with_calibration(None)
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenRouter-style chat completions API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(
            api_key,
            "https://github.com/tacryt-socryp/condense-rs",
            "condense",
        )
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        Self::with_timeout(api_key, referer, title, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a new client with a custom request timeout. Timeout expiry is
    /// reported as [`SummarizeError::Timeout`] so the pipeline retries it.
    pub fn with_timeout(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("condense/0.2")
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Set the model used for all calls from this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature used for all calls from this client.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Send one summarization request.
    async fn complete(
        &self,
        messages: &[Message],
        max_output_tokens: u32,
    ) -> Result<FlushResult, SummarizeError> {
        let body = SummaryRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            max_tokens: max_output_tokens,
            temperature: self.temperature,
        };

        debug!(
            "Summarization request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizeError::Timeout(format!("request failed: {e}"))
                } else {
                    SummarizeError::Unavailable(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SummarizeError::Unavailable(format!("failed to read response: {e}")))?;

        let elapsed = start.elapsed();
        debug!(
            "Summarization response: HTTP {} in {:.1}s ({} bytes)",
            status,
            elapsed.as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| SummarizeError::Unavailable(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(SummarizeError::Unavailable(format!(
                "API error: {}",
                err.message
            )));
        }

        let usage = parsed.usage.as_ref().and_then(|u| u.total_tokens);
        if let Some(ref u) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                u.prompt_tokens.unwrap_or(0),
                u.completion_tokens.unwrap_or(0),
                u.total_tokens.unwrap_or(0),
            );
        }

        let content = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            // An empty body with HTTP 200 typically means a transient
            // upstream failure, not a deliberate empty summary.
            return Err(SummarizeError::Unavailable(
                "empty completion in successful response".to_string(),
            ));
        }

        Ok(FlushResult {
            summary_text: content,
            backend_reported_usage: usage,
        })
    }
}

impl SummaryBackend for OpenRouterClient {
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
        max_output_tokens: u32,
    ) -> SummarizeFuture<'a> {
        Box::pin(self.complete(messages, max_output_tokens))
    }
}
