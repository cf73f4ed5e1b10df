use crate::error::IngestError;
use crate::models::IngestionOptions;
use sha2::{Digest, Sha256};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub window_words: usize,
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig::from(&IngestionOptions::default())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            window_words: value.window_words,
            overlap_words: value.overlap_words,
        }
    }
}

impl ChunkingConfig {
    pub fn new(window_words: usize, overlap_words: usize) -> Result<Self, IngestError> {
        let config = Self {
            window_words,
            overlap_words,
        };
        config.validate()?;
        Ok(config)
    }

    /// The overlap must leave a positive step, otherwise windows never advance.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.window_words == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "window_words must be greater than zero".to_string(),
            ));
        }
        if self.overlap_words >= self.window_words {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_words ({}) must be smaller than window_words ({})",
                self.overlap_words, self.window_words
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.window_words - self.overlap_words
    }
}

/// Token index ranges of each window over `token_count` tokens.
///
/// Windows start at multiples of `window - overlap`; the last window is the
/// first one whose end reaches the token count, so it absorbs the tail.
pub fn chunk_spans(
    token_count: usize,
    config: ChunkingConfig,
) -> Result<Vec<Range<usize>>, IngestError> {
    config.validate()?;

    let mut spans = Vec::new();
    let mut start = 0;
    while start < token_count {
        let end = start.saturating_add(config.window_words);
        spans.push(start..end.min(token_count));
        if end >= token_count {
            break;
        }
        start += config.step();
    }

    Ok(spans)
}

pub fn chunk_words(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    let tokens = text.split_whitespace().collect::<Vec<_>>();
    let spans = chunk_spans(tokens.len(), config)?;

    Ok(spans
        .into_iter()
        .map(|span| tokens[span].join(" "))
        .collect())
}

pub fn make_chunk_id(document_id: &str, position: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(position.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
