use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("error extracting text from {format}: {details}")]
    Extraction { format: String, details: String },

    #[error("no text could be extracted from {0}")]
    EmptyText(String),

    #[error("document is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("index update failed: {0}")]
    Index(String),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl IngestError {
    /// Whether the failure came from the document content rather than the
    /// caller's configuration or the index.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            IngestError::Extraction { .. }
                | IngestError::EmptyText(_)
                | IngestError::TooLarge { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no index for session: {0}")]
    NotReady(String),

    #[error("search request failed: {0}")]
    Request(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
