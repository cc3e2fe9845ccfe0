use crate::error::{MemoryError, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Embedding dimension for lite embedder
const LITE_DIM: usize = 384;

/// Upper bound on a single round trip to the embedding daemon
const SERVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for dense embedding implementations
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
}

// =============================================================================
// LiteEmbedder - N-gram hashing
// =============================================================================

/// Lightweight embedder using character n-gram hashing
pub struct LiteEmbedder {
    dim: usize,
}

impl Default for LiteEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl LiteEmbedder {
    pub fn new() -> Self {
        Self { dim: LITE_DIM }
    }
}

impl Embedder for LiteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        let text = text.trim();
        let mut vector = vec![0.0f32; self.dim];

        // Character trigrams
        let chars: Vec<char> = text.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            vector[self.bucket(&trigram)] += 1.0;
        }

        // Words count double, punctuation stripped
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[self.bucket(word)] += 2.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl LiteEmbedder {
    fn bucket(&self, token: &str) -> usize {
        (md5_hash(token) % self.dim as u128) as usize
    }
}

/// Compute MD5 hash and return as u128
fn md5_hash(text: &str) -> u128 {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    u128::from_be_bytes(result.into())
}

// =============================================================================
// ServerEmbedder - Unix socket client for an external embedding daemon
// =============================================================================

#[derive(Serialize)]
struct EmbedBatchRequest<'a> {
    cmd: &'a str,
    texts: &'a [&'a str],
}

#[derive(Serialize)]
struct PingRequest<'a> {
    cmd: &'a str,
}

#[derive(Deserialize)]
struct EmbedBatchResponse {
    ok: bool,
    embeddings: Option<Vec<Vec<f32>>>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct PingResponse {
    ok: bool,
    model: Option<String>,
    error: Option<String>,
}

/// Embedder backed by a daemon speaking one JSON request per connection
pub struct ServerEmbedder {
    socket: PathBuf,
}

impl ServerEmbedder {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.socket.exists() && self.ping().is_ok()
    }

    /// Ping the server and get the model name
    pub fn ping(&self) -> Result<String> {
        let response: PingResponse = self.send_request(&PingRequest { cmd: "ping" })?;

        if response.ok {
            Ok(response.model.unwrap_or_default())
        } else {
            Err(MemoryError::Embedding(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }

    /// Send a request to the embedding server and parse the response
    fn send_request<R, T>(&self, request: &R) -> Result<T>
    where
        R: Serialize,
        T: for<'de> Deserialize<'de>,
    {
        let connect_err = |e: std::io::Error| {
            MemoryError::Embedding(format!("Failed to connect to {}: {}", self.socket.display(), e))
        };
        let mut stream = UnixStream::connect(&self.socket).map_err(connect_err)?;
        stream
            .set_read_timeout(Some(SERVER_TIMEOUT))
            .map_err(transport_err)?;
        stream
            .set_write_timeout(Some(SERVER_TIMEOUT))
            .map_err(transport_err)?;

        let json = serde_json::to_vec(request)?;
        stream.write_all(&json).map_err(transport_err)?;

        // Shutdown write side to signal end of request
        stream
            .shutdown(std::net::Shutdown::Write)
            .map_err(transport_err)?;

        // Read response (up to 16MB, batches of large vectors add up)
        let mut buffer = Vec::new();
        stream
            .take(16 * 1024 * 1024)
            .read_to_end(&mut buffer)
            .map_err(transport_err)?;

        Ok(serde_json::from_slice(&buffer)?)
    }
}

fn transport_err(e: std::io::Error) -> MemoryError {
    MemoryError::Embedding(format!("Embedding server I/O failed: {}", e))
}

impl Embedder for ServerEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| MemoryError::Embedding("No embedding in response".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedBatchRequest {
            cmd: "embed_batch",
            texts,
        };
        let response: EmbedBatchResponse = self.send_request(&request)?;

        if !response.ok {
            return Err(MemoryError::Embedding(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        let embeddings = response
            .embeddings
            .ok_or_else(|| MemoryError::Embedding("No embeddings in response".to_string()))?;
        if embeddings.len() != texts.len() {
            return Err(MemoryError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

// =============================================================================
// Cosine similarity
// =============================================================================

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(vec_a: &[f32], vec_b: &[f32]) -> f64 {
    if vec_a.len() != vec_b.len() {
        return 0.0;
    }

    let dot: f32 = vec_a.iter().zip(vec_b.iter()).map(|(a, b)| a * b).sum();
    let norm_a: f32 = vec_a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = vec_b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}
