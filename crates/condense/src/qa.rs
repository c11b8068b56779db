//! Embedding-based document QA: index, rank, answer.
//!
//! A separate, much simpler read path than the summarization pipeline: no
//! batching, no backoff state machine. Documents are embedded once through
//! an Ollama-compatible endpoint, questions are ranked against them by
//! cosine similarity, and the top documents become context for a single
//! answer call through the same [`SummaryBackend`] the pipeline uses.

use crate::ingest::scan::{doc_id_for, find_documents};
use crate::{Message, SummaryBackend};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_EMBEDDINGS_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDINGS_MODEL: &str = "embeddinggemma";

/// Characters of a document fed to the embedding model.
const EMBED_INPUT_CAP: usize = 4_000;
/// Characters of a document included as answer context.
const CONTEXT_DOC_CAP: usize = 3_000;
/// Documents shorter than this are skipped at indexing time.
const MIN_CONTENT_CHARS: usize = 10;

// ── Embedding seam ─────────────────────────────────────────────────

/// Boxed future returned by [`EmbeddingBackend::embed`].
pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, String>> + Send + 'a>>;

/// Maps text to an embedding vector.
pub trait EmbeddingBackend: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Client for an Ollama-compatible `/api/embed` endpoint.
pub struct OllamaEmbeddings {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddings {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    async fn fetch(&self, text: &str) -> Result<Vec<f32>, String> {
        let resp = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| format!("embedding request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("embedding endpoint HTTP {status}: {body}"));
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| format!("failed to parse embedding response: {e}"))?;

        parsed
            .embeddings
            .and_then(|mut v| if v.is_empty() { None } else { Some(v.swap_remove(0)) })
            .or(parsed.embedding)
            .ok_or_else(|| "embedding response carried no vector".to_string())
    }
}

impl EmbeddingBackend for OllamaEmbeddings {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(self.fetch(text))
    }
}

// ── Ranking ────────────────────────────────────────────────────────

/// Cosine similarity of two vectors; `0.0` for zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// One indexed document: id, full content, embedding of its head.
pub struct IndexedDocument {
    pub name: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// In-memory embedding index over a document directory.
pub struct DocumentIndex {
    documents: Vec<IndexedDocument>,
}

impl DocumentIndex {
    /// Index every document under `dir`. Unreadable files and failed
    /// embeddings are skipped with a warning rather than failing the whole
    /// index.
    pub async fn build(dir: &Path, embedder: &dyn EmbeddingBackend) -> Result<Self, String> {
        let paths = find_documents(dir)?;
        info!("Indexing {} document(s) under {}", paths.len(), dir.display());

        let mut readable: Vec<(String, String)> = Vec::new();
        for path in &paths {
            match std::fs::read_to_string(path) {
                Ok(content) if content.trim().len() >= MIN_CONTENT_CHARS => {
                    readable.push((doc_id_for(path), content));
                }
                Ok(_) => debug!("Skipping near-empty document {}", path.display()),
                Err(e) => warn!("Skipping unreadable document {}: {e}", path.display()),
            }
        }

        // join_all preserves input order, so results zip back onto their
        // documents positionally.
        let embeddings = futures::future::join_all(readable.iter().map(|(_, content)| {
            let head: String = content.chars().take(EMBED_INPUT_CAP).collect();
            async move { embedder.embed(&head).await }
        }))
        .await;

        let mut documents = Vec::new();
        for ((name, content), result) in readable.into_iter().zip(embeddings) {
            match result {
                Ok(embedding) => documents.push(IndexedDocument {
                    name,
                    content,
                    embedding,
                }),
                Err(e) => warn!("Failed to embed {name}: {e}"),
            }
        }

        info!("Indexed {} document(s)", documents.len());
        Ok(Self { documents })
    }

    /// Build an index from pre-embedded documents.
    pub fn from_documents(documents: Vec<IndexedDocument>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The `top_k` documents most similar to a query embedding, best first.
    pub fn rank(&self, query: &[f32], top_k: usize) -> Vec<(&IndexedDocument, f32)> {
        let mut scored: Vec<(&IndexedDocument, f32)> = self
            .documents
            .iter()
            .map(|doc| (doc, cosine_similarity(query, &doc.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        scored
    }

    /// Answer a question from the `top_k` most relevant documents.
    pub async fn ask(
        &self,
        question: &str,
        embedder: &dyn EmbeddingBackend,
        backend: &dyn SummaryBackend,
        top_k: usize,
    ) -> Result<String, String> {
        if self.documents.is_empty() {
            return Err("no documents indexed".to_string());
        }

        let query = embedder.embed(question).await?;
        let ranked = self.rank(&query, top_k);

        let context = ranked
            .iter()
            .map(|(doc, score)| {
                let body: String = doc.content.chars().take(CONTEXT_DOC_CAP).collect();
                format!("--- {} (relevance: {score:.3}) ---\n{body}", doc.name)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Based on the following documents, answer the user's question.\n\n\
             DOCUMENTS:\n{context}\n\n\
             USER QUESTION: {question}\n\n\
             Answer from the document contents. If the answer cannot be found \
             in the documents, state that clearly. Be specific and cite which \
             documents contain the relevant information."
        );

        let result = backend
            .summarize(&[Message::system(prompt)], 1024)
            .await
            .map_err(|e| e.to_string())?;

        let sources = ranked
            .iter()
            .map(|(doc, _)| doc.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("{}\n\nSources: {sources}", result.summary_text))
    }
}
