//! Genre-conditioned nearest-neighbor search over the catalog.

use serde::Serialize;

use crate::catalog::Catalog;
use crate::errors::InferenceError;
use crate::genre::Genre;
use crate::semantic::index::{l2_normalize, IndexError, VectorIndex};
use crate::semantic::TextEmbedder;

/// A catalog hit. `score` is the raw value the index returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub title: String,
    pub score: f32,
}

/// Embeds queries and searches the catalog index.
pub struct SemanticRetriever {
    embedder: Box<dyn TextEmbedder>,
    index: VectorIndex,
    catalog: Catalog,
}

/// The text actually embedded for a query. Catalog plots were embedded
/// with the same `"<genre>: <text>"` framing.
pub fn compose_query(genre: Genre, query: &str) -> String {
    format!("{}: {}", genre, query)
}

impl SemanticRetriever {
    /// Callers are expected to have checked that the catalog, index and
    /// embedder agree on size and width; see `ResourceCache`.
    pub fn new(embedder: Box<dyn TextEmbedder>, index: VectorIndex, catalog: Catalog) -> Self {
        Self {
            embedder,
            index,
            catalog,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Return up to `k` catalog entries closest to `query` framed by `genre`,
    /// in the index's best-first order.
    pub fn search(
        &self,
        query: &str,
        genre: Genre,
        k: usize,
    ) -> Result<Vec<MatchResult>, InferenceError> {
        if k == 0 {
            return Err(IndexError::ZeroK.into());
        }

        let composed = compose_query(genre, query);
        let mut embedding = self.embedder.embed(&composed)?;
        l2_normalize(&mut embedding)?;

        let neighbors = self.index.search(&embedding, k)?;

        neighbors
            .into_iter()
            .map(|n| {
                let title = self.catalog.title(n.position).ok_or_else(|| {
                    InferenceError::Output(format!(
                        "index position {} has no catalog title",
                        n.position
                    ))
                })?;
                Ok(MatchResult {
                    title: title.to_string(),
                    score: n.score,
                })
            })
            .collect()
    }
}
