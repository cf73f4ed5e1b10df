use crate::embeddings::vector_space;
use crate::index::SessionRegistry;
use crate::ingest::prepare_document;
use crate::retriever::join_context;
use crate::traits::DocumentIndex;
use crate::{
    IngestError, IngestionOptions, RetrievalOptions, RetrievedChunk, SearchError, SessionStats,
    UploadOutcome, UploadReport, VectorStrategy,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Entry point for callers: uploads go in, grounding context comes out.
/// Creates session state on first upload and drops it on delete.
pub struct DocumentCoordinator<I = SessionRegistry>
where
    I: DocumentIndex,
{
    index: I,
    ingestion: IngestionOptions,
    retrieval: RetrievalOptions,
}

impl DocumentCoordinator<SessionRegistry> {
    pub fn with_strategy(
        strategy: VectorStrategy,
        max_features: usize,
        ingestion: IngestionOptions,
        retrieval: RetrievalOptions,
    ) -> Result<Self, IngestError> {
        let space = vector_space(strategy, max_features)?;
        Ok(Self::new(SessionRegistry::new(space), ingestion, retrieval))
    }
}

impl<I> DocumentCoordinator<I>
where
    I: DocumentIndex + Send + Sync,
{
    pub fn new(index: I, ingestion: IngestionOptions, retrieval: RetrievalOptions) -> Self {
        Self {
            index,
            ingestion,
            retrieval,
        }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Extracts, chunks and indexes one document. On error the session's
    /// index is exactly as it was before the call.
    pub async fn try_upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        session_id: &str,
    ) -> Result<UploadOutcome, IngestError> {
        let started = Instant::now();
        let options = self.ingestion.clone();
        let name = filename.to_string();
        let session = session_id.to_string();

        let prepared = tokio::task::spawn_blocking(move || {
            prepare_document(&bytes, &name, &session, &options)
        })
        .await
        .map_err(|error| IngestError::Worker(format!("extraction: {error}")))??;

        let chunk_count = prepared.chunks.len();
        let stats = self
            .index
            .ingest(session_id, &prepared.fingerprint.document_id, prepared.chunks)
            .await?;

        info!(
            session_id,
            filename,
            format = %prepared.fingerprint.format,
            bytes = prepared.fingerprint.byte_len,
            chunk_count,
            session_chunks = stats.chunk_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document uploaded"
        );

        Ok(UploadOutcome {
            fingerprint: prepared.fingerprint,
            text: prepared.text,
            chunk_count,
            stats,
        })
    }

    /// Like [`try_upload`](Self::try_upload) but reports failure in the
    /// returned value instead of an error.
    pub async fn upload(&self, bytes: Vec<u8>, filename: &str, session_id: &str) -> UploadReport {
        match self.try_upload(bytes, filename, session_id).await {
            Ok(outcome) => outcome.into(),
            Err(error) => {
                warn!(session_id, filename, %error, "document upload failed");
                UploadReport::failed(filename, error)
            }
        }
    }

    pub async fn try_search(
        &self,
        session_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let options = match top_k {
            Some(top_k) => self.retrieval.with_top_k(top_k),
            None => self.retrieval,
        };
        self.index.search(session_id, query, options).await
    }

    /// Ranked chunks for `query`; empty when the session has no index or
    /// nothing clears the relevance threshold.
    pub async fn search(
        &self,
        session_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Vec<RetrievedChunk> {
        match self.try_search(session_id, query, top_k).await {
            Ok(hits) => {
                debug!(session_id, hits = hits.len(), "session search");
                hits
            }
            Err(SearchError::NotReady(_)) => {
                debug!(session_id, "no index for session, empty context");
                Vec::new()
            }
            Err(error) => {
                warn!(session_id, %error, "session search failed, empty context");
                Vec::new()
            }
        }
    }

    pub async fn context_for_query(
        &self,
        session_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> String {
        join_context(&self.search(session_id, query, top_k).await)
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.index.drop_session(session_id).await
    }

    pub fn session_stats(&self, session_id: &str) -> Option<SessionStats> {
        self.index.stats(session_id)
    }
}
