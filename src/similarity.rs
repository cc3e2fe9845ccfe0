//! Text similarity engine.
//!
//! Every method maps text to a [`Vector`] and compares vectors with cosine
//! similarity clamped to `[0, 1]`. TF-IDF vectors depend on the corpus, so a
//! [`CorpusVectors`] is built from the memory snapshot at the start of each
//! read and queries are vectorized against it.

use crate::config::SIMILARITY_METHODS;
use crate::embeddings::{cosine_similarity, Embedder, LiteEmbedder, ServerEmbedder};
use crate::error::{MemoryError, Result};
use crate::types::Memory;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, warn};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("token pattern is valid"));

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "d", "did", "do", "does", "doing", "don", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "im", "in", "into", "is", "it", "its",
    "itself", "just", "ll", "m", "me", "more", "most", "my", "myself", "no", "nor", "not", "now",
    "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over",
    "own", "re", "s", "same", "she", "should", "so", "some", "such", "t", "than", "that", "the",
    "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "ve", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you",
    "your", "yours", "yourself", "yourselves",
];

static STOP_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

/// Lowercased word tokens with punctuation and stop words removed
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| !STOP_SET.contains(token))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Vectors
// =============================================================================

/// A text embedded by one of the similarity methods
#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    /// Term -> weight; ordered so sums are reproducible
    Sparse(BTreeMap<String, f64>),
    Dense(Vec<f32>),
}

impl Vector {
    pub fn is_zero(&self) -> bool {
        match self {
            Vector::Sparse(terms) => terms.values().all(|w| *w == 0.0),
            Vector::Dense(values) => values.iter().all(|v| *v == 0.0),
        }
    }
}

/// Cosine similarity clamped to `[0, 1]`; zero for zero-length or mismatched vectors
pub fn similarity(a: &Vector, b: &Vector) -> f64 {
    let raw = match (a, b) {
        (Vector::Sparse(a), Vector::Sparse(b)) => sparse_cosine(a, b),
        (Vector::Dense(a), Vector::Dense(b)) => cosine_similarity(a, b),
        _ => 0.0,
    };

    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn sparse_cosine(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }

    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// =============================================================================
// TF-IDF
// =============================================================================

/// Inverse document frequencies fitted over a corpus
#[derive(Debug, Clone, Default)]
pub struct TfIdfModel {
    idf: BTreeMap<String, f64>,
}

impl TfIdfModel {
    /// Smoothed IDF: `ln((1 + N) / (1 + df)) + 1`, so a single-document
    /// corpus still gets weight 1 per term.
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let terms: BTreeSet<String> = tokenize(doc.as_ref()).into_iter().collect();
            for term in terms {
                *df.entry(term).or_default() += 1;
            }
        }

        let n = documents.len() as f64;
        let idf = df
            .into_iter()
            .map(|(term, count)| {
                let weight = ((1.0 + n) / (1.0 + count as f64)).ln() + 1.0;
                (term, weight)
            })
            .collect();

        Self { idf }
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    /// Raw term counts times IDF. Terms the corpus never saw are dropped.
    pub fn vectorize(&self, text: &str) -> Vector {
        let mut weights: BTreeMap<String, f64> = BTreeMap::new();
        for term in tokenize(text) {
            if let Some(idf) = self.idf.get(&term) {
                *weights.entry(term).or_default() += idf;
            }
        }
        Vector::Sparse(weights)
    }
}

// =============================================================================
// Methods
// =============================================================================

/// The closed set of similarity strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimilarityMethod {
    TfIdf,
    Lite,
    Server,
}

impl SimilarityMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SimilarityMethod::TfIdf => "tfidf",
            SimilarityMethod::Lite => "lite",
            SimilarityMethod::Server => "server",
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SimilarityMethod {
    type Err = MemoryError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "tfidf" => Ok(SimilarityMethod::TfIdf),
            "lite" => Ok(SimilarityMethod::Lite),
            "server" => Ok(SimilarityMethod::Server),
            _ => Err(MemoryError::UnknownMethod(name.to_string())),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Document vectors for one snapshot, all produced by the same method
pub struct CorpusVectors {
    method: SimilarityMethod,
    tfidf: TfIdfModel,
    documents: Vec<Vector>,
}

impl CorpusVectors {
    pub fn method(&self) -> SimilarityMethod {
        self.method
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Vector] {
        &self.documents
    }
}

/// Scores text against memories with a switchable method
pub struct SimilarityEngine {
    method: RwLock<SimilarityMethod>,
    lite: LiteEmbedder,
    server: ServerEmbedder,
    /// Dense vectors per memory id, tagged with the method that produced them
    cache: Mutex<HashMap<String, (SimilarityMethod, Vec<f32>)>>,
}

impl SimilarityEngine {
    pub fn new(method: SimilarityMethod, embedding_socket: impl Into<PathBuf>) -> Self {
        Self {
            method: RwLock::new(method),
            lite: LiteEmbedder::new(),
            server: ServerEmbedder::new(embedding_socket),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn available_methods() -> Vec<&'static str> {
        SIMILARITY_METHODS.iter().map(|m| m.name).collect()
    }

    pub fn current_method(&self) -> SimilarityMethod {
        *self.method.read()
    }

    /// Switch methods; an unknown name leaves the current method in place
    pub fn set_method(&self, name: &str) -> Result<SimilarityMethod> {
        let method: SimilarityMethod = name.parse()?;
        *self.method.write() = method;
        self.cache.lock().clear();
        debug!(%method, "similarity method changed");
        Ok(method)
    }

    pub fn server(&self) -> &ServerEmbedder {
        &self.server
    }

    /// Drop cached vectors for a deleted memory
    pub fn invalidate(&self, id: &str) {
        self.cache.lock().remove(id);
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Embed every memory in `memories` with the current method.
    ///
    /// A memory that fails to embed gets an empty vector and scores zero
    /// against everything.
    pub fn vectorize_corpus(&self, memories: &[Memory]) -> CorpusVectors {
        let method = self.current_method();
        match method {
            SimilarityMethod::TfIdf => {
                let contents: Vec<&str> = memories.iter().map(|m| m.content.as_str()).collect();
                let tfidf = TfIdfModel::fit(&contents);
                let documents = contents.iter().map(|c| tfidf.vectorize(c)).collect();
                CorpusVectors {
                    method,
                    tfidf,
                    documents,
                }
            }
            SimilarityMethod::Lite | SimilarityMethod::Server => CorpusVectors {
                method,
                tfidf: TfIdfModel::default(),
                documents: self.dense_documents(method, memories),
            },
        }
    }

    /// Embed a free-text query against `corpus`. `None` means the query can
    /// match nothing.
    pub fn vectorize_query(&self, corpus: &CorpusVectors, query: &str) -> Option<Vector> {
        if query.trim().is_empty() {
            return None;
        }

        let vector = match corpus.method {
            SimilarityMethod::TfIdf => corpus.tfidf.vectorize(query),
            method => match self.embedder(method).embed(query) {
                Ok(values) => Vector::Dense(values),
                Err(e) => {
                    warn!(error = %e, "query embedding failed, no memory context available");
                    return None;
                }
            },
        };

        (!vector.is_zero()).then_some(vector)
    }

    /// Relevance of `query` to each memory, in snapshot order
    pub fn relevance(&self, query: &str, memories: &[Memory]) -> Option<Vec<f64>> {
        let corpus = self.vectorize_corpus(memories);
        let query = self.vectorize_query(&corpus, query)?;
        Some(
            corpus
                .documents
                .iter()
                .map(|doc| similarity(&query, doc))
                .collect(),
        )
    }

    fn embedder(&self, method: SimilarityMethod) -> &dyn Embedder {
        match method {
            SimilarityMethod::Server => &self.server,
            _ => &self.lite,
        }
    }

    /// Dense vectors for `memories`, embedding only what the cache lacks.
    /// Cache entries for ids outside `memories` are dropped, so a search
    /// racing a delete cannot leave the deleted id cached for good.
    fn dense_documents(&self, method: SimilarityMethod, memories: &[Memory]) -> Vec<Vector> {
        let mut vectors: Vec<Option<Vec<f32>>> = {
            let mut cache = self.cache.lock();
            let live: HashSet<&str> = memories.iter().map(|m| m.id.as_str()).collect();
            cache.retain(|id, _| live.contains(id.as_str()));
            memories
                .iter()
                .map(|m| match cache.get(&m.id) {
                    Some((cached, values)) if *cached == method => Some(values.clone()),
                    _ => None,
                })
                .collect()
        };

        let missing: Vec<usize> = (0..memories.len())
            .filter(|i| vectors[*i].is_none())
            .collect();

        if !missing.is_empty() {
            let texts: Vec<&str> = missing
                .iter()
                .map(|i| memories[*i].content.as_str())
                .collect();

            match self.embedder(method).embed_batch(&texts) {
                Ok(embedded) => {
                    let mut cache = self.cache.lock();
                    for (i, values) in missing.iter().zip(embedded) {
                        cache.insert(memories[*i].id.clone(), (method, values.clone()));
                        vectors[*i] = Some(values);
                    }
                }
                Err(e) => {
                    warn!(%method, count = missing.len(), error = %e, "document embedding failed, scoring as zero");
                }
            }
        }

        vectors
            .into_iter()
            .map(|v| Vector::Dense(v.unwrap_or_default()))
            .collect()
    }
}
