//! One-time loading of every model, index and table the pipeline needs.
//!
//! `ResourceCache::acquire` performs the expensive load at most once and
//! hands every caller the same `Arc<ResourceBundle>`. Concurrent first
//! callers block on the cache lock until the winner finishes loading.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::answerer::{ExtractiveAnswerer, SpanDecoding, SpanScorer};
use crate::catalog::{self, Catalog, ContextRecord};
use crate::classifier::{GenreClassifier, LabelScorer};
use crate::config::Config;
use crate::context::ContextResolver;
use crate::errors::ResourceUnavailable;
use crate::genre::Genre;
use crate::inference::{OnnxClassifier, OnnxSpanScorer};
use crate::semantic::{EmbeddingModel, FaissIndexFile, SemanticRetriever, TextEmbedder, VectorIndex};

/// Everything the pipeline reads at query time. Immutable once built.
pub struct ResourceBundle {
    pub classifier: GenreClassifier,
    pub retriever: SemanticRetriever,
    pub contexts: ContextResolver,
    pub answerer: ExtractiveAnswerer,
}

/// Loaded but not yet cross-checked artifacts.
pub struct BundleParts {
    pub label_scorer: Box<dyn LabelScorer>,
    pub embedder: Box<dyn TextEmbedder>,
    pub index: VectorIndex,
    pub catalog: Catalog,
    pub contexts: Vec<ContextRecord>,
    pub span_scorer: Box<dyn SpanScorer>,
    pub span_decoding: SpanDecoding,
}

impl ResourceBundle {
    /// Check that the parts agree with each other and assemble the bundle.
    pub fn assemble(parts: BundleParts) -> Result<Self, ResourceUnavailable> {
        if parts.catalog.len() != parts.index.len() {
            return Err(ResourceUnavailable::Inconsistent {
                artifact: "title mapping",
                other: "vector index",
                reason: format!(
                    "{} titles but {} vectors",
                    parts.catalog.len(),
                    parts.index.len()
                ),
            });
        }

        if parts.embedder.dimensions() != parts.index.dimensions() {
            return Err(ResourceUnavailable::Inconsistent {
                artifact: "embedding model",
                other: "vector index",
                reason: format!(
                    "model produces {} dimensions, index holds {}",
                    parts.embedder.dimensions(),
                    parts.index.dimensions()
                ),
            });
        }

        if parts.index.is_empty() {
            log::warn!("vector index holds no vectors, every search will come back empty");
        }

        // probe once so a head with the wrong label count fails at startup
        let probe = parts
            .label_scorer
            .scores("test")
            .map_err(|e| ResourceUnavailable::Inconsistent {
                artifact: "genre classifier",
                other: "genre inventory",
                reason: format!("probe failed: {e}"),
            })?;
        if probe.len() != Genre::COUNT {
            return Err(ResourceUnavailable::Inconsistent {
                artifact: "genre classifier",
                other: "genre inventory",
                reason: format!("{} outputs for {} genres", probe.len(), Genre::COUNT),
            });
        }

        let bundle = Self {
            classifier: GenreClassifier::new(parts.label_scorer),
            retriever: SemanticRetriever::new(parts.embedder, parts.index, parts.catalog),
            contexts: ContextResolver::new(parts.contexts),
            answerer: ExtractiveAnswerer::new(parts.span_scorer, parts.span_decoding),
        };
        log::debug!(
            "{} titles, {} synopses, {:?} span decoding",
            bundle.retriever.catalog().len(),
            bundle.contexts.len(),
            bundle.answerer.decoding()
        );
        Ok(bundle)
    }

    /// Load every artifact named by `config` from disk.
    pub fn load(config: &Config) -> Result<Self, ResourceUnavailable> {
        let base = config.base_path();
        let artifacts = &config.artifacts;

        let missing = artifacts.missing(base);
        for (artifact, path) in &missing {
            log::error!("missing {artifact}: {}", path.display());
        }
        if let Some((artifact, path)) = missing.into_iter().next() {
            return Err(ResourceUnavailable::Missing { artifact, path });
        }

        let titles_path = base.join(&artifacts.titles);
        let catalog = timed("title mapping", || Catalog::load(&titles_path))
            .map_err(|e| malformed("title mapping", &titles_path, e))?;

        let index_path = base.join(&artifacts.index);
        let index = timed("vector index", || FaissIndexFile::new(index_path.clone()).load())
            .map_err(|e| malformed("vector index", &index_path, e))?;

        let contexts_path = base.join(&artifacts.contexts);
        let contexts = timed("context table", || catalog::load_contexts(&contexts_path))
            .map_err(|e| malformed("context table", &contexts_path, e))?;

        let cache_dir = config.models_cache();
        let embedder = timed("embedding model", || {
            EmbeddingModel::new(&config.embedding_model, cache_dir.clone())
        })
        .map_err(|e| malformed("embedding model", &cache_dir, e))?;
        log::debug!("query embedder {} ready", embedder.name());

        let label_scorer = timed("genre classifier", || {
            OnnxClassifier::load(
                &base.join(&artifacts.genre_model),
                &base.join(&artifacts.genre_tokenizer),
                config.max_input_tokens,
            )
        })?;

        let span_scorer = timed("QA model", || {
            OnnxSpanScorer::load(
                &base.join(&artifacts.qa_model),
                &base.join(&artifacts.qa_tokenizer),
                config.max_input_tokens,
            )
        })?;

        Self::assemble(BundleParts {
            label_scorer: Box::new(label_scorer),
            embedder: Box::new(embedder),
            index,
            catalog,
            contexts,
            span_scorer: Box::new(span_scorer),
            span_decoding: config.span_decoding,
        })
    }
}

fn timed<T, E>(artifact: &str, load: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    let now = Instant::now();
    let result = load();
    if result.is_ok() {
        log::info!(
            "loaded {artifact} in {}ms",
            now.elapsed().as_micros() as f64 / 1000.0
        );
    }
    result
}

fn malformed(artifact: &'static str, path: &Path, err: impl std::fmt::Display) -> ResourceUnavailable {
    ResourceUnavailable::Malformed {
        artifact,
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

type Loader = dyn Fn() -> Result<ResourceBundle, ResourceUnavailable> + Send + Sync;

/// Process-wide holder of the loaded bundle.
pub struct ResourceCache {
    loader: Box<Loader>,
    /// Mutex<Option<_>> instead of OnceLock so the bundle can be released,
    /// and because get_or_try_init is unstable.
    bundle: Mutex<Option<Arc<ResourceBundle>>>,
}

impl ResourceCache {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<ResourceBundle, ResourceUnavailable> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            bundle: Mutex::new(None),
        }
    }

    /// Cache that loads from disk as described by `config`.
    pub fn from_config(config: Config) -> Self {
        Self::new(move || ResourceBundle::load(&config))
    }

    /// Return the shared bundle, loading it on first use. A failed load
    /// leaves the cache empty so a later call can try again.
    pub fn acquire(&self) -> Result<Arc<ResourceBundle>, ResourceUnavailable> {
        // the guarded value is only ever None or a finished bundle, so a
        // poisoned lock is still safe to use
        let mut guard = self.bundle.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(bundle) = guard.as_ref() {
            return Ok(Arc::clone(bundle));
        }

        log::info!("loading models and datasets");
        let now = Instant::now();
        let bundle = Arc::new((self.loader)()?);
        log::info!(
            "resources ready in {}ms",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        *guard = Some(Arc::clone(&bundle));
        Ok(bundle)
    }

    /// Drop the cached bundle. Outstanding handles stay valid; the next
    /// `acquire` loads again. Returns whether anything was cached.
    pub fn release(&self) -> bool {
        let mut guard = self.bundle.lock().unwrap_or_else(|e| e.into_inner());
        let released = guard.take().is_some();
        if released {
            log::info!("released cached resources");
        }
        released
    }

    pub fn is_loaded(&self) -> bool {
        self.bundle
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}
