//! Per-session chunk index.
//!
//! Each session owns an immutable [`SessionSnapshot`]: its chunks, the model
//! fitted on exactly those chunks, and one vector per chunk. Ingest builds a
//! new snapshot next to the current one and swaps it in only when the re-fit
//! succeeded, so readers never observe chunks and vectors from different
//! fits. Writers to one session are serialised by that session's writer
//! lock; different sessions never contend.

use crate::chunking::make_chunk_id;
use crate::embeddings::Embedder;
use crate::retriever::rank;
use crate::traits::{DocumentIndex, VectorSpace};
use crate::{
    IndexedChunk, IngestError, RetrievalOptions, RetrievedChunk, SearchError, SessionStats,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct SessionSnapshot {
    session_id: String,
    chunks: Vec<IndexedChunk>,
    vectors: Vec<Vec<f32>>,
    model: Arc<dyn Embedder>,
    generation: u64,
}

impl SessionSnapshot {
    /// Appends `incoming` to the chunks of `previous` and re-fits the whole
    /// corpus. `previous` is not modified.
    pub fn build(
        session_id: &str,
        previous: Option<&SessionSnapshot>,
        document_id: &str,
        incoming: Vec<String>,
        space: &dyn VectorSpace,
    ) -> Result<Self, IngestError> {
        let mut chunks = previous
            .map(|snapshot| snapshot.chunks.clone())
            .unwrap_or_default();

        let first_ordinal = chunks.len();
        for (offset, text) in incoming.into_iter().enumerate() {
            let ordinal = first_ordinal + offset;
            chunks.push(IndexedChunk {
                chunk_id: make_chunk_id(document_id, ordinal as u64, &text),
                document_id: document_id.to_string(),
                ordinal,
                text,
            });
        }

        let corpus = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>();
        let model = space.fit(&corpus)?;
        let vectors = chunks
            .iter()
            .map(|chunk| model.embed(&chunk.text))
            .collect();

        Ok(Self {
            session_id: session_id.to_string(),
            chunks,
            vectors,
            model,
            generation: previous.map_or(1, |snapshot| snapshot.generation + 1),
        })
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dimensions(&self) -> usize {
        self.model.dimensions()
    }

    /// Vectorises `text` with the same fit that produced the chunk vectors.
    pub fn query_vector(&self, text: &str) -> Vec<f32> {
        self.model.embed(text)
    }

    pub fn stats(&self) -> SessionStats {
        let documents = self
            .chunks
            .iter()
            .map(|chunk| chunk.document_id.as_str())
            .collect::<HashSet<_>>();

        SessionStats {
            session_id: self.session_id.clone(),
            chunk_count: self.chunks.len(),
            document_count: documents.len(),
            dimensions: self.dimensions(),
            generation: self.generation,
        }
    }
}

struct SessionSlot {
    /// Held for the whole read-modify-write of an ingest. `true` once the
    /// slot has been removed from the registry.
    writer: Arc<Mutex<bool>>,
    current: RwLock<Option<Arc<SessionSnapshot>>>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            writer: Arc::new(Mutex::new(false)),
            current: RwLock::new(None),
        }
    }

    fn load(&self) -> Option<Arc<SessionSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, snapshot: Option<Arc<SessionSnapshot>>) -> Option<Arc<SessionSnapshot>> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, snapshot)
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    space: Arc<dyn VectorSpace>,
}

impl SessionRegistry {
    pub fn new(space: Arc<dyn VectorSpace>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            space,
        }
    }

    pub fn strategy(&self) -> &'static str {
        self.space.name()
    }

    /// Current snapshot, or `None` when nothing was ever ingested (or the
    /// session was deleted).
    pub fn snapshot(&self, session_id: &str) -> Option<Arc<SessionSnapshot>> {
        self.read_sessions()
            .get(session_id)
            .and_then(|slot| slot.load())
    }

    pub fn query_vector(&self, session_id: &str, query: &str) -> Result<Vec<f32>, SearchError> {
        self.snapshot(session_id)
            .map(|snapshot| snapshot.query_vector(query))
            .ok_or_else(|| SearchError::NotReady(session_id.to_string()))
    }

    pub fn session_count(&self) -> usize {
        self.read_sessions()
            .values()
            .filter(|slot| slot.load().is_some())
            .count()
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SessionSlot>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SessionSlot>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_or_create(&self, session_id: &str) -> Arc<SessionSlot> {
        if let Some(slot) = self.read_sessions().get(session_id) {
            return Arc::clone(slot);
        }
        Arc::clone(
            self.write_sessions()
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionSlot::new())),
        )
    }

    /// Locks the live slot for `session_id`, retrying if a delete retired
    /// the slot while we waited.
    async fn lock_live_slot(&self, session_id: &str) -> (Arc<SessionSlot>, OwnedMutexGuard<bool>) {
        loop {
            let slot = self.slot_or_create(session_id);
            let guard = Arc::clone(&slot.writer).lock_owned().await;
            if !*guard {
                return (slot, guard);
            }
            debug!(session_id, "slot retired while waiting, retrying");
        }
    }

    fn forget_slot(&self, session_id: &str, slot: &Arc<SessionSlot>) {
        let mut sessions = self.write_sessions();
        if sessions
            .get(session_id)
            .is_some_and(|registered| Arc::ptr_eq(registered, slot))
        {
            sessions.remove(session_id);
        }
    }
}

#[async_trait]
impl DocumentIndex for SessionRegistry {
    async fn ingest(
        &self,
        session_id: &str,
        document_id: &str,
        chunks: Vec<String>,
    ) -> Result<SessionStats, IngestError> {
        if chunks.is_empty() {
            debug!(session_id, document_id, "empty chunk list, index unchanged");
            return Ok(self.stats(session_id).unwrap_or_else(|| SessionStats {
                session_id: session_id.to_string(),
                chunk_count: 0,
                document_count: 0,
                dimensions: 0,
                generation: 0,
            }));
        }

        let started = Instant::now();
        let incoming = chunks.len();
        let (slot, mut retired) = self.lock_live_slot(session_id).await;
        let previous = slot.load();
        let had_previous = previous.is_some();

        let space = Arc::clone(&self.space);
        let session = session_id.to_string();
        let document = document_id.to_string();
        let built = tokio::task::spawn_blocking(move || {
            SessionSnapshot::build(&session, previous.as_deref(), &document, chunks, space.as_ref())
        })
        .await
        .map_err(|error| IngestError::Worker(format!("re-fit: {error}")))
        .and_then(|result| result);

        let snapshot = match built {
            Ok(snapshot) => Arc::new(snapshot),
            Err(error) => {
                warn!(session_id, document_id, %error, "re-fit failed, previous index kept");
                if !had_previous {
                    *retired = true;
                    self.forget_slot(session_id, &slot);
                }
                return Err(error);
            }
        };

        slot.store(Some(Arc::clone(&snapshot)));
        drop(retired);

        info!(
            session_id,
            document_id,
            strategy = self.space.name(),
            incoming,
            chunk_count = snapshot.chunks.len(),
            dimensions = snapshot.dimensions(),
            generation = snapshot.generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session index re-fit"
        );

        Ok(snapshot.stats())
    }

    async fn search(
        &self,
        session_id: &str,
        query: &str,
        options: RetrievalOptions,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let snapshot = self
            .snapshot(session_id)
            .ok_or_else(|| SearchError::NotReady(session_id.to_string()))?;

        let query = query.to_string();
        tokio::task::spawn_blocking(move || rank(&snapshot, &query, options))
            .await
            .map_err(|error| SearchError::Request(error.to_string()))
    }

    async fn drop_session(&self, session_id: &str) -> bool {
        let removed = self.write_sessions().remove(session_id);
        let Some(slot) = removed else {
            return false;
        };

        let mut retired = slot.writer.lock().await;
        *retired = true;
        let dropped = slot.store(None);

        info!(
            session_id,
            chunk_count = dropped.as_ref().map_or(0, |snapshot| snapshot.chunks.len()),
            "session index dropped"
        );
        dropped.is_some()
    }

    fn stats(&self, session_id: &str) -> Option<SessionStats> {
        self.snapshot(session_id).map(|snapshot| snapshot.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::default_vector_space;

    #[derive(Debug)]
    struct PoisonAwareSpace;

    impl VectorSpace for PoisonAwareSpace {
        fn name(&self) -> &'static str {
            "poison-aware"
        }

        fn fit(&self, corpus: &[&str]) -> Result<Arc<dyn Embedder>, IngestError> {
            if corpus.iter().any(|text| text.contains("poison")) {
                return Err(IngestError::Index("poisoned corpus".to_string()));
            }
            default_vector_space()?.fit(corpus)
        }
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(default_vector_space().unwrap())
    }

    fn owned(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|text| text.to_string()).collect()
    }

    #[tokio::test]
    async fn first_ingest_creates_the_session() {
        let index = registry();
        assert!(index.snapshot("s1").is_none());

        let stats = index
            .ingest("s1", "doc-a", owned(&["pump pressure limits", "valve seat wear"]))
            .await
            .unwrap();

        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.generation, 1);
        assert_eq!(index.session_count(), 1);
    }

    #[tokio::test]
    async fn second_ingest_refits_every_vector() {
        let index = registry();
        index
            .ingest("s1", "doc-a", owned(&["pump pressure limits"]))
            .await
            .unwrap();
        let before = index.snapshot("s1").unwrap();

        index
            .ingest("s1", "doc-b", owned(&["gearbox oil temperature", "pump seal"]))
            .await
            .unwrap();
        let after = index.snapshot("s1").unwrap();

        assert_eq!(after.generation(), 2);
        assert_eq!(after.chunks().len(), 3);
        assert_eq!(after.vectors().len(), 3);
        assert!(after.dimensions() > before.dimensions());
        for vector in after.vectors() {
            assert_eq!(vector.len(), after.dimensions());
        }
        assert_eq!(
            after.chunks().iter().map(|chunk| chunk.ordinal).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(before.chunks().len(), 1);
    }

    #[tokio::test]
    async fn empty_ingest_leaves_state_untouched() {
        let index = registry();
        index.ingest("s1", "doc-a", Vec::new()).await.unwrap();
        assert!(index.snapshot("s1").is_none());
        assert_eq!(index.session_count(), 0);

        index
            .ingest("s1", "doc-a", owned(&["pump pressure limits"]))
            .await
            .unwrap();
        let before = index.snapshot("s1").unwrap();
        let stats = index.ingest("s1", "doc-b", Vec::new()).await.unwrap();
        let after = index.snapshot("s1").unwrap();

        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.generation, 1);
    }

    #[tokio::test]
    async fn query_vector_requires_an_index() {
        let index = registry();
        assert!(matches!(
            index.query_vector("missing", "pump"),
            Err(SearchError::NotReady(_))
        ));

        index
            .ingest("s1", "doc-a", owned(&["pump pressure limits"]))
            .await
            .unwrap();
        let vector = index.query_vector("s1", "pump").unwrap();
        assert_eq!(vector.len(), index.snapshot("s1").unwrap().dimensions());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let index = registry();
        index
            .ingest("a", "doc-a", owned(&["hydraulic pump pressure"]))
            .await
            .unwrap();
        let a_before = index.snapshot("a").unwrap();
        let a_results = index
            .search("a", "pump pressure", RetrievalOptions::default())
            .await
            .unwrap();

        index
            .ingest("b", "doc-b", owned(&["pump pressure pump pressure", "unrelated text"]))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a_before, &index.snapshot("a").unwrap()));
        assert_eq!(
            index
                .search("a", "pump pressure", RetrievalOptions::default())
                .await
                .unwrap(),
            a_results
        );
        assert_eq!(index.stats("b").unwrap().chunk_count, 2);
    }

    #[tokio::test]
    async fn dropped_session_behaves_like_a_new_one() {
        let index = registry();
        index
            .ingest("s1", "doc-a", owned(&["pump pressure limits"]))
            .await
            .unwrap();

        assert!(index.drop_session("s1").await);
        assert!(index.snapshot("s1").is_none());
        assert!(index.stats("s1").is_none());
        assert!(matches!(
            index.search("s1", "pump", RetrievalOptions::default()).await,
            Err(SearchError::NotReady(_))
        ));
        assert!(!index.drop_session("s1").await);

        let stats = index
            .ingest("s1", "doc-b", owned(&["valve seat wear"]))
            .await
            .unwrap();
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.generation, 1);
    }

    #[tokio::test]
    async fn failed_refit_keeps_previous_snapshot() {
        let index = SessionRegistry::new(Arc::new(PoisonAwareSpace));
        index
            .ingest("s1", "doc-a", owned(&["pump pressure limits"]))
            .await
            .unwrap();
        let before = index.snapshot("s1").unwrap();

        let error = index
            .ingest("s1", "doc-b", owned(&["poison pill"]))
            .await
            .unwrap_err();
        assert!(matches!(error, IngestError::Index(_)));

        let after = index.snapshot("s1").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.chunks().len(), 1);
    }

    #[tokio::test]
    async fn failed_first_ingest_leaves_no_session() {
        let index = SessionRegistry::new(Arc::new(PoisonAwareSpace));
        assert!(index
            .ingest("s1", "doc-a", owned(&["poison pill"]))
            .await
            .is_err());

        assert!(index.snapshot("s1").is_none());
        assert_eq!(index.session_count(), 0);
        assert!(!index.drop_session("s1").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ingests_into_one_session_do_not_lose_updates() {
        let index = Arc::new(registry());

        let mut handles = Vec::new();
        for upload in 0..8 {
            let index = Arc::clone(&index);
            handles.push(tokio::spawn(async move {
                let document = format!("doc-{upload}");
                let chunks = (0..3)
                    .map(|part| format!("upload{upload} part{part} shared words"))
                    .collect();
                index.ingest("shared", &document, chunks).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = index.snapshot("shared").unwrap();
        assert_eq!(snapshot.generation(), 8);
        assert_eq!(snapshot.chunks().len(), 24);
        assert_eq!(snapshot.vectors().len(), 24);
        assert_eq!(snapshot.stats().document_count, 8);

        let ordinals = snapshot
            .chunks()
            .iter()
            .map(|chunk| chunk.ordinal)
            .collect::<Vec<_>>();
        assert_eq!(ordinals, (0..24).collect::<Vec<_>>());
    }
}
