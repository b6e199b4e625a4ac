use crate::error::EmbeddingError;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Text → fixed-length vector. One vector per input, order preserved.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn name(&self) -> &str;
}

/// Sentence embeddings from fastembed (BGE-Small-En-v1.5).
///
/// The model is loaded on the first `embed` call and kept for the life of the
/// provider; inference runs on the blocking pool.
pub struct FastEmbedProvider {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    show_download_progress: bool,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_loaded", &"Dynamic")
            .field("show_download_progress", &self.show_download_progress)
            .finish()
    }
}

impl Default for FastEmbedProvider {
    fn default() -> Self {
        Self::new(false)
    }
}

impl FastEmbedProvider {
    pub fn new(show_download_progress: bool) -> Self {
        Self {
            model: Arc::new(Mutex::new(None)),
            show_download_progress,
        }
    }

    async fn load(&self) -> Result<TextEmbedding, EmbeddingError> {
        info!("Initializing fastembed model (BGE-Small-En-V1.5)...");
        let options = InitOptions::new(EmbeddingModel::BGESmallENV15)
            .with_show_download_progress(self.show_download_progress);

        let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
            .await?
            .map_err(|e| EmbeddingError::ModelLoad(e.to_string()))?;
        info!("Embedding model loaded.");
        Ok(model)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let mut model_guard = self.model.lock().await;
        let mut owned_model = match model_guard.take() {
            Some(model) => model,
            None => self.load().await?,
        };

        let (embeddings_res, returned_model) = tokio::task::spawn_blocking(move || {
            let res = owned_model.embed(texts, None);
            (res, owned_model)
        })
        .await?;

        // Put the model back before surfacing an inference error.
        *model_guard = Some(returned_model);
        let embeddings = embeddings_res.map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        if embeddings.len() != expected {
            return Err(EmbeddingError::EmptyOutput {
                expected,
                actual: embeddings.len(),
            });
        }
        Ok(embeddings)
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}

/// Deterministic hashed bag-of-words vectors.
///
/// Each lowercase alphanumeric token increments one bucket. Needs no model
/// download, so it backs offline deployments and tests.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimension: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl HashedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        "hashed"
    }
}

/// Lowercased runs of alphanumeric characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
