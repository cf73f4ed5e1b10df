use crate::error::IngestError;
use crate::models::{VectorStrategy, DEFAULT_MAX_FEATURES};
use crate::tfidf::TfidfSpace;
use crate::traits::VectorSpace;
use std::fmt;
use std::sync::Arc;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// A fitted text-to-vector mapping. Every vector it returns has
/// `dimensions()` components.
pub trait Embedder: fmt::Debug + Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// Feature hashing ignores corpus statistics, so fitting is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedNgramSpace {
    pub embedder: CharacterNgramEmbedder,
}

impl VectorSpace for HashedNgramSpace {
    fn name(&self) -> &'static str {
        "hashed-ngram"
    }

    fn fit(&self, _corpus: &[&str]) -> Result<Arc<dyn Embedder>, IngestError> {
        Ok(Arc::new(self.embedder))
    }
}

pub fn vector_space(
    strategy: VectorStrategy,
    max_features: usize,
) -> Result<Arc<dyn VectorSpace>, IngestError> {
    let space: Arc<dyn VectorSpace> = match strategy {
        VectorStrategy::Tfidf => Arc::new(TfidfSpace::new(max_features)?),
        VectorStrategy::HashedNgram => Arc::new(HashedNgramSpace::default()),
    };
    Ok(space)
}

pub fn default_vector_space() -> Result<Arc<dyn VectorSpace>, IngestError> {
    vector_space(VectorStrategy::default(), DEFAULT_MAX_FEATURES)
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
