//! In-memory flat vector index with exact nearest-neighbor search.
//!
//! Vectors are addressed by their position, which is also the row of the
//! catalog entry they were built from. The index is never mutated once the
//! catalog is loaded.

use std::cmp::Ordering;

/// Similarity metric the index was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Raw dot product, higher is better. Equals cosine similarity when
    /// both sides are L2-normalized.
    InnerProduct,
    /// Squared euclidean distance, lower is better.
    L2,
}

impl Metric {
    /// Ordering that puts the better of two scores first.
    fn best_first(self, a: f32, b: f32) -> Ordering {
        let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        match self {
            Metric::InnerProduct => ord.reverse(),
            Metric::L2 => ord,
        }
    }
}

/// In-memory flat index over row-major vectors.
pub struct VectorIndex {
    /// `len * dimensions` values, vector `i` at `[i * dimensions..]`
    data: Vec<f32>,
    dimensions: usize,
    metric: Metric,
}

/// Search hit from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Position of the vector in the index
    pub position: usize,
    /// Raw metric value (inner product or squared distance)
    pub score: f32,
}

impl VectorIndex {
    /// Create an empty index with the given dimensions.
    pub fn new(dimensions: usize, metric: Metric) -> Self {
        Self {
            data: Vec::new(),
            dimensions,
            metric,
        }
    }

    /// Build an index from a flat row-major buffer.
    pub fn from_flat(
        dimensions: usize,
        metric: Metric,
        data: Vec<f32>,
    ) -> Result<Self, IndexError> {
        if dimensions == 0 {
            return Err(IndexError::ZeroDimensions);
        }
        if data.len() % dimensions != 0 {
            return Err(IndexError::RaggedBuffer {
                dimensions,
                values: data.len(),
            });
        }
        Ok(Self {
            data,
            dimensions,
            metric,
        })
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Get the number of vectors in the index.
    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector at the next position.
    pub fn push(&mut self, embedding: &[f32]) -> Result<usize, IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }
        self.data.extend_from_slice(embedding);
        Ok(self.len() - 1)
    }

    /// Get the vector stored at `position`.
    #[cfg(test)]
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    /// Exact k-nearest-neighbor search.
    ///
    /// Returns at most `k` hits, best first. Equal scores keep ascending
    /// position order. Asking for more than `len()` returns every vector.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Err(IndexError::ZeroK);
        }
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut results: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimensions)
            .enumerate()
            .map(|(position, target)| Neighbor {
                position,
                score: self.score(query, target),
            })
            .collect();

        // stable sort keeps position order among ties
        results.sort_by(|a, b| self.metric.best_first(a.score, b.score));
        results.truncate(k);

        Ok(results)
    }

    fn score(&self, query: &[f32], target: &[f32]) -> f32 {
        match self.metric {
            Metric::InnerProduct => query.iter().zip(target).map(|(a, b)| a * b).sum(),
            Metric::L2 => query
                .iter()
                .zip(target)
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
        }
    }
}

/// Scale `v` to unit L2 norm in place.
pub fn l2_normalize(v: &mut [f32]) -> Result<(), IndexError> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return Err(IndexError::ZeroNormVector);
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot search with zero-norm vector")]
    ZeroNormVector,

    #[error("Index dimensions must be non-zero")]
    ZeroDimensions,

    #[error("Buffer of {values} values is not a multiple of {dimensions} dimensions")]
    RaggedBuffer { dimensions: usize, values: usize },

    #[error("k must be at least 1")]
    ZeroK,
}
