use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extractor::DocumentFormat;

pub const DEFAULT_WINDOW_WORDS: usize = 1_000;
pub const DEFAULT_OVERLAP_WORDS: usize = 200;
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FEATURES: usize = 5_000;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MIN_SCORE: f32 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub checksum: String,
    pub byte_len: usize,
    pub ingested_at: DateTime<Utc>,
}

/// A chunk as held by a session index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub document_id: String,
    /// Position within the session corpus; breaks score ties.
    pub ordinal: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VectorStrategy {
    #[default]
    Tfidf,
    HashedNgram,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub window_words: usize,
    pub overlap_words: usize,
    pub max_document_bytes: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            window_words: DEFAULT_WINDOW_WORDS,
            overlap_words: DEFAULT_OVERLAP_WORDS,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub top_k: usize,
    /// Results must score strictly above this.
    pub min_score: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl RetrievalOptions {
    pub fn with_top_k(self, top_k: usize) -> Self {
        Self { top_k, ..self }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStats {
    pub session_id: String,
    pub chunk_count: usize,
    pub document_count: usize,
    pub dimensions: usize,
    pub generation: u64,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub fingerprint: DocumentFingerprint,
    pub text: String,
    pub chunk_count: usize,
    pub stats: SessionStats,
}

/// Caller-facing upload summary; failures are reported, not raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReport {
    pub filename: String,
    pub processed: bool,
    pub chunks: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadReport {
    pub fn failed(filename: &str, error: impl ToString) -> Self {
        Self {
            filename: filename.to_string(),
            processed: false,
            chunks: 0,
            text: String::new(),
            error: Some(error.to_string()),
        }
    }
}

impl From<UploadOutcome> for UploadReport {
    fn from(value: UploadOutcome) -> Self {
        Self {
            filename: value.fingerprint.filename,
            processed: true,
            chunks: value.chunk_count,
            text: value.text,
            error: None,
        }
    }
}
