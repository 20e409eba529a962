//! Query embedder backed by fastembed.
//!
//! The catalog vectors were produced offline with one sentence-transformers
//! model, so only models whose output space can match are accepted here.
//! Weights are fetched into the cache directory on first use.

use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{InitOptions, TextEmbedding};

/// Anything that turns text into a fixed-width vector.
///
/// The catalog index was built with one particular model; the embedder used
/// at query time must be the same model so the vectors are comparable.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimensions(&self) -> usize;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding model failed to start: {0}")]
    InitFailed(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("unsupported embedding model '{0}'")]
    InvalidModel(String),
}

/// Accepted names, lowercase, with the fastembed model they select.
const SUPPORTED_MODELS: &[(&str, fastembed::EmbeddingModel)] = &[
    ("all-minilm-l6-v2", fastembed::EmbeddingModel::AllMiniLML6V2),
    ("sentence-transformers/all-minilm-l6-v2", fastembed::EmbeddingModel::AllMiniLML6V2),
    ("all-minilm-l6-v2-q", fastembed::EmbeddingModel::AllMiniLML6V2Q),
    ("all-minilm-l12-v2", fastembed::EmbeddingModel::AllMiniLML12V2),
    ("bge-small-en-v1.5", fastembed::EmbeddingModel::BGESmallENV15),
];

/// fastembed model held behind a lock, since its `embed` takes `&mut self`.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Load `model_name`, downloading it into `cache_dir` when absent.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let selected = lookup_model(model_name)?;

        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("cannot create {}: {e}", cache_dir.display()))
        })?;

        let options = InitOptions::new(selected)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(true);
        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        // width is only known once the model has produced a vector
        let dimensions = model
            .embed(vec!["probe"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("probe failed: {e}")))?
            .first()
            .map(Vec::len)
            .ok_or_else(|| EmbeddingError::InitFailed("probe returned nothing".to_string()))?;

        log::debug!("embedding model {model_name} produces {dimensions} dimensions");

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }
}

fn lookup_model(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    let wanted = name.trim().to_lowercase();
    SUPPORTED_MODELS
        .iter()
        .find(|(alias, _)| *alias == wanted)
        .map(|(_, model)| model.clone())
        .ok_or_else(|| EmbeddingError::InvalidModel(name.to_string()))
}

impl TextEmbedder for EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::EmbeddingFailed(format!("model lock poisoned: {e}")))?;

        model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no vector returned".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
