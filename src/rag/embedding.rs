//! Embedding clients for summary vectors.
//!
//! The default is a local fastembed model (AllMiniLML6V2, 384 dimensions,
//! matching the vector indexes). A deterministic fake exists for tests.

use super::RagError;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;
use tracing::info;

pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of texts. The outer `Vec` is positional; a `None`
    /// means that text could not be embedded.
    fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, RagError>;

    fn dimensions(&self) -> usize;
}

pub fn create_embedding_client() -> Result<Box<dyn EmbeddingClient>, RagError> {
    Ok(Box::new(FastEmbedClient::new()?))
}

/// Local sentence embedding model.
pub struct FastEmbedClient {
    model: Mutex<TextEmbedding>,
    dimensions: usize,
}

impl FastEmbedClient {
    pub fn new() -> Result<Self, RagError> {
        info!("Loading local embedding model");
        let mut model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| RagError::Embedding(e.to_string()))?;

        let probe = model
            .embed(vec!["probe"], None)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        let dimensions = probe.into_iter().next().map(|v| v.len()).unwrap_or(0);
        info!("Embedding model ready ({dimensions} dimensions)");

        Ok(Self {
            model: Mutex::new(model),
            dimensions,
        })
    }
}

impl EmbeddingClient for FastEmbedClient {
    fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self
            .model
            .lock()
            .map_err(|_| RagError::Embedding("embedding model mutex poisoned".into()))?
            .embed(texts.to_vec(), None)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        Ok(embeddings.into_iter().map(Some).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Deterministic offline embedder for tests.
pub struct FakeEmbeddingClient {
    dimensions: usize,
}

impl FakeEmbeddingClient {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl EmbeddingClient for FakeEmbeddingClient {
    fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, RagError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut seed = 0u32;
                for b in text.bytes() {
                    seed = seed.wrapping_mul(31).wrapping_add(b as u32);
                }
                Some(
                    (0..self.dimensions)
                        .map(|i| ((seed.wrapping_add(i as u32) % 1000) as f32) / 1000.0)
                        .collect(),
                )
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
