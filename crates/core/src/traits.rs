use crate::embeddings::Embedder;
use crate::{IngestError, RetrievalOptions, RetrievedChunk, SearchError, SessionStats};
use async_trait::async_trait;
use std::sync::Arc;

/// A representation strategy. `fit` is called with the complete chunk list
/// of a session every time that list changes.
pub trait VectorSpace: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit(&self, corpus: &[&str]) -> Result<Arc<dyn Embedder>, IngestError>;
}

#[async_trait]
pub trait DocumentIndex {
    /// Appends one document's chunks to the session and re-fits it.
    /// An empty `chunks` leaves the session as it was.
    async fn ingest(
        &self,
        session_id: &str,
        document_id: &str,
        chunks: Vec<String>,
    ) -> Result<SessionStats, IngestError>;

    async fn search(
        &self,
        session_id: &str,
        query: &str,
        options: RetrievalOptions,
    ) -> Result<Vec<RetrievedChunk>, SearchError>;

    /// Returns whether the session held any state.
    async fn drop_session(&self, session_id: &str) -> bool;

    fn stats(&self, session_id: &str) -> Option<SessionStats>;
}
