pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod retriever;
pub mod tfidf;
pub mod traits;

pub use chunking::{chunk_spans, chunk_words, ChunkingConfig};
pub use embeddings::{
    cosine_similarity, default_vector_space, vector_space, CharacterNgramEmbedder, Embedder,
    HashedNgramSpace, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, SearchError};
pub use extractor::{
    extract_declared, extract_text, DocumentFormat, TextExtractor, ALLOWED_EXTENSIONS,
};
pub use index::{SessionRegistry, SessionSnapshot};
pub use ingest::{digest_bytes, discover_documents, prepare_document, PreparedDocument};
pub use models::{
    DocumentFingerprint, IndexedChunk, IngestionOptions, RetrievalOptions, RetrievedChunk,
    SessionStats, UploadOutcome, UploadReport, VectorStrategy,
};
pub use orchestrator::DocumentCoordinator;
pub use retriever::{join_context, rank};
pub use tfidf::{TfidfModel, TfidfSpace};
pub use traits::{DocumentIndex, VectorSpace};
