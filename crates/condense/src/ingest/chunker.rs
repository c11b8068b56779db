//! Word-level chunking of pre-extracted document text.
//!
//! Tokenizes on word boundaries (any non-alphanumeric character separates
//! tokens), drops English stopwords, and joins the residue into fixed-size
//! word chunks. Dense technical content survives; filler doesn't pad the
//! token budget.
//!
//! The produced [`ChunkSource`] is pre-scanned: its length is known before
//! the first chunk is consumed, and consumption is strictly in order.

use crate::TokenEstimator;
use crate::pipeline::accumulator::Chunk;
use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;

/// English stopwords dropped during tokenization.
const STOPWORD_LIST: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
    "with", "about", "against", "between", "into", "through", "during", "before", "after",
    "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
    "again", "further", "then", "once", "here", "there", "when", "where", "why", "how", "all",
    "any", "both", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
    "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will", "just", "don",
    "should", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "couldn", "didn",
    "doesn", "hadn", "hasn", "haven", "isn", "ma", "mightn", "mustn", "needn", "shan",
    "shouldn", "wasn", "weren", "won", "wouldn",
];

static STOPWORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOPWORD_LIST.iter().copied().collect());

/// Whether a token is an English stopword (case-insensitive).
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word.to_lowercase().as_str())
}

/// Tokenize text into content words: alphanumeric runs that are not
/// stopwords. Punctuation and whitespace separate tokens and are dropped.
pub fn content_words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter(|w| !is_stopword(w))
        .collect()
}

/// A finite, ordered, pre-scanned sequence of chunks for one document.
///
/// The total is known before consumption begins — the pipeline's
/// forced-final-flush rule needs to recognize the last chunk when it is
/// offered, not after the source runs dry.
#[derive(Debug)]
pub struct ChunkSource {
    chunks: VecDeque<Chunk>,
    total: usize,
}

impl ChunkSource {
    /// Chunk a document's text into fixed-size word chunks with
    /// pre-computed token costs.
    pub fn from_text(text: &str, chunk_size_words: usize, estimator: &TokenEstimator) -> Self {
        let words = content_words(text);
        let chunks: VecDeque<Chunk> = words
            .chunks(chunk_size_words.max(1))
            .enumerate()
            .map(|(i, window)| {
                let chunk_text = window.join(" ");
                let token_cost = estimator.cost(&chunk_text);
                Chunk::new(i, chunk_text, token_cost)
            })
            .collect();
        let total = chunks.len();
        Self { chunks, total }
    }

    /// Build a source from pre-made chunks. Useful for callers that chunk
    /// by other means (and for tests).
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let total = chunks.len();
        Self {
            chunks: chunks.into(),
            total,
        }
    }

    /// Consume the next chunk, in sequence order.
    pub fn next(&mut self) -> Option<Chunk> {
        self.chunks.pop_front()
    }

    /// Total chunks in the document, known up front.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Chunks not yet consumed.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}
