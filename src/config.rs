use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::answerer::SpanDecoding;
use crate::semantic::DEFAULT_MODEL;

const CONFIG_FILE: &str = "config.yaml";

/// Number of matches shown per query
const DEFAULT_TOP_K: usize = 3;
/// Input length limit of the DistilBERT-family models
const DEFAULT_MAX_INPUT_TOKENS: usize = 512;

/// Where each artifact lives. Relative paths are resolved against the base
/// directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    #[serde(default = "default_genre_model")]
    pub genre_model: PathBuf,
    #[serde(default = "default_genre_tokenizer")]
    pub genre_tokenizer: PathBuf,
    #[serde(default = "default_qa_model")]
    pub qa_model: PathBuf,
    #[serde(default = "default_qa_tokenizer")]
    pub qa_tokenizer: PathBuf,
    #[serde(default = "default_index")]
    pub index: PathBuf,
    #[serde(default = "default_titles")]
    pub titles: PathBuf,
    #[serde(default = "default_contexts")]
    pub contexts: PathBuf,
    /// fastembed download cache, created on demand
    #[serde(default = "default_models_cache")]
    pub models_cache: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            genre_model: default_genre_model(),
            genre_tokenizer: default_genre_tokenizer(),
            qa_model: default_qa_model(),
            qa_tokenizer: default_qa_tokenizer(),
            index: default_index(),
            titles: default_titles(),
            contexts: default_contexts(),
            models_cache: default_models_cache(),
        }
    }
}

fn default_genre_model() -> PathBuf {
    PathBuf::from("genre_model/model.onnx")
}

fn default_genre_tokenizer() -> PathBuf {
    PathBuf::from("genre_model/tokenizer.json")
}

fn default_qa_model() -> PathBuf {
    PathBuf::from("qa_model/model.onnx")
}

fn default_qa_tokenizer() -> PathBuf {
    PathBuf::from("qa_model/tokenizer.json")
}

fn default_index() -> PathBuf {
    PathBuf::from("movie_plots_index.faiss")
}

fn default_titles() -> PathBuf {
    PathBuf::from("titles_mapping.csv")
}

fn default_contexts() -> PathBuf {
    PathBuf::from("context.csv")
}

fn default_models_cache() -> PathBuf {
    PathBuf::from("models")
}

impl ArtifactPaths {
    /// Artifacts that must exist before anything is loaded, with their
    /// absolute locations.
    pub fn required(&self, base: &Path) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("genre classifier", base.join(&self.genre_model)),
            ("genre tokenizer", base.join(&self.genre_tokenizer)),
            ("QA model", base.join(&self.qa_model)),
            ("QA tokenizer", base.join(&self.qa_tokenizer)),
            ("vector index", base.join(&self.index)),
            ("title mapping", base.join(&self.titles)),
            ("context table", base.join(&self.contexts)),
        ]
    }

    /// Required artifacts that are not on disk.
    pub fn missing(&self, base: &Path) -> Vec<(&'static str, PathBuf)> {
        self.required(base)
            .into_iter()
            .filter(|(_, path)| !path.exists())
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// fastembed model name; must be the model the index was built with
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Tokens kept per model input, longer inputs are truncated
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    #[serde(default)]
    pub span_decoding: SpanDecoding,

    /// Per-request limit on classification, search and answering
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    #[serde(default)]
    pub artifacts: ArtifactPaths,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_model: default_embedding_model(),
            top_k: DEFAULT_TOP_K,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            span_decoding: SpanDecoding::default(),
            request_timeout_secs: None,
            artifacts: ArtifactPaths::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_max_input_tokens() -> usize {
    DEFAULT_MAX_INPUT_TOKENS
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        if self.max_input_tokens < 8 {
            bail!(
                "max_input_tokens must be at least 8, got {}",
                self.max_input_tokens
            );
        }
        if self.request_timeout_secs == Some(0) {
            bail!("request_timeout_secs must be greater than 0 when set");
        }
        if self.embedding_model.trim().is_empty() {
            bail!("embedding_model must not be empty");
        }
        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing the defaults first if
    /// the file does not exist yet.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let path = base_path.join(CONFIG_FILE);

        if !path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("wrote default config to {}", path.display());
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("config at {} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        Ok(config)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn with_base_path(mut self, base_path: &Path) -> Self {
        self.base_path = base_path.to_path_buf();
        self
    }

    pub fn models_cache(&self) -> PathBuf {
        self.base_path.join(&self.artifacts.models_cache)
    }

    pub fn request_timeout(&self) -> Option<std::time::Duration> {
        self.request_timeout_secs
            .map(std::time::Duration::from_secs)
    }
}

/// `REELQA_BASE_PATH`, or `~/.local/share/reelqa`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("REELQA_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(home.join(".local/share/reelqa"))
}
