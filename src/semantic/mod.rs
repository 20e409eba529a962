//! Semantic retrieval over the movie catalog.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed for query embedding
//! - `index`: In-memory flat vector index with exact search
//! - `faiss`: Reader for the prebuilt FAISS flat index file
//! - `retriever`: Genre-conditioned catalog search

pub mod embeddings;
pub mod faiss;
mod index;
mod retriever;

pub use embeddings::{EmbeddingError, EmbeddingModel, TextEmbedder};
pub use faiss::{FaissError, FaissIndexFile};
pub use index::{l2_normalize, IndexError, Metric, Neighbor, VectorIndex};
pub use retriever::{compose_query, MatchResult, SemanticRetriever};

/// Default embedding model name, the one the catalog index was built with
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
