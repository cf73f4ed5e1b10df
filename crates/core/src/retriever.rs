use crate::embeddings::cosine_similarity;
use crate::index::SessionSnapshot;
use crate::{RetrievalOptions, RetrievedChunk};
use std::cmp::Ordering;

pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Scores every chunk of `snapshot` against `query`, best first.
///
/// Only chunks scoring strictly above `options.min_score` are kept, so the
/// result may be shorter than `top_k`. Equal scores keep insertion order.
pub fn rank(
    snapshot: &SessionSnapshot,
    query: &str,
    options: RetrievalOptions,
) -> Vec<RetrievedChunk> {
    if options.top_k == 0 || snapshot.chunks().is_empty() {
        return Vec::new();
    }

    let query_vector = snapshot.query_vector(query);
    let mut scored = snapshot
        .chunks()
        .iter()
        .zip(snapshot.vectors())
        .map(|(chunk, vector)| (chunk, cosine_similarity(&query_vector, vector)))
        .collect::<Vec<_>>();

    scored.sort_by(|left, right| match right.1.total_cmp(&left.1) {
        Ordering::Equal => left.0.ordinal.cmp(&right.0.ordinal),
        other => other,
    });

    scored
        .into_iter()
        .filter(|(_, score)| *score > options.min_score)
        .take(options.top_k)
        .map(|(chunk, score)| RetrievedChunk {
            chunk_id: chunk.chunk_id.clone(),
            document_id: chunk.document_id.clone(),
            ordinal: chunk.ordinal,
            score,
            text: chunk.text.clone(),
        })
        .collect()
}

pub fn join_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
