//! Corpus-relative term weighting.
//!
//! A [`TfidfSpace`] is fitted on the full chunk list of one session. The
//! resulting [`TfidfModel`] maps text to L2-normalised `tf * idf` vectors over
//! the fitted vocabulary, and must be used for both chunks and queries of
//! that session.

use crate::embeddings::{l2_normalize, Embedder};
use crate::error::IngestError;
use crate::traits::VectorSpace;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const TOKEN_PATTERN: &str = r"\b\w\w+\b";

#[derive(Debug, Clone)]
pub struct TfidfSpace {
    max_features: usize,
    token_pattern: Regex,
}

impl TfidfSpace {
    pub fn new(max_features: usize) -> Result<Self, IngestError> {
        Ok(Self {
            max_features: max_features.max(1),
            token_pattern: Regex::new(TOKEN_PATTERN)?,
        })
    }

    pub fn fit_model(&self, corpus: &[&str]) -> Result<TfidfModel, IngestError> {
        let documents = corpus
            .iter()
            .map(|text| tokenize(&self.token_pattern, text))
            .collect::<Vec<_>>();

        // term -> (corpus count, document frequency)
        let mut totals: HashMap<&str, (usize, usize)> = HashMap::new();
        for tokens in &documents {
            let mut seen = HashSet::new();
            for token in tokens {
                let entry = totals.entry(token.as_str()).or_default();
                entry.0 += 1;
                if seen.insert(token.as_str()) {
                    entry.1 += 1;
                }
            }
        }

        if totals.is_empty() {
            return Err(IngestError::Index(
                "empty vocabulary; documents contain no indexable terms".to_string(),
            ));
        }

        let mut terms = totals
            .into_iter()
            .map(|(term, (count, df))| (term, count, df))
            .collect::<Vec<_>>();

        if terms.len() > self.max_features {
            terms.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(right.0)));
            terms.truncate(self.max_features);
        }
        terms.sort_by(|left, right| left.0.cmp(right.0));

        let document_count = corpus.len() as f32;
        let mut vocabulary = HashMap::with_capacity(terms.len());
        let mut idf = Vec::with_capacity(terms.len());
        for (index, (term, _count, df)) in terms.into_iter().enumerate() {
            vocabulary.insert(term.to_string(), index);
            idf.push(((1.0 + document_count) / (1.0 + df as f32)).ln() + 1.0);
        }

        Ok(TfidfModel {
            vocabulary,
            idf,
            token_pattern: self.token_pattern.clone(),
        })
    }
}

impl VectorSpace for TfidfSpace {
    fn name(&self) -> &'static str {
        "tfidf"
    }

    fn fit(&self, corpus: &[&str]) -> Result<Arc<dyn Embedder>, IngestError> {
        Ok(Arc::new(self.fit_model(corpus)?))
    }
}

#[derive(Debug, Clone)]
pub struct TfidfModel {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    token_pattern: Regex,
}

impl TfidfModel {
    pub fn contains_term(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }
}

impl Embedder for TfidfModel {
    fn dimensions(&self) -> usize {
        self.idf.len()
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.idf.len()];
        for token in tokenize(&self.token_pattern, text) {
            if let Some(&index) = self.vocabulary.get(&token) {
                vector[index] += 1.0;
            }
        }
        for (value, idf) in vector.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        l2_normalize(&mut vector);
        vector
    }
}

fn tokenize(pattern: &Regex, text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    pattern
        .find_iter(&lowered)
        .map(|token| token.as_str().to_string())
        .collect()
}
