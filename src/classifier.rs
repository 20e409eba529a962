//! Genre classification of free-text queries.

use crate::errors::InferenceError;
use crate::genre::Genre;
use crate::inference::argmax;

/// A sequence classification model: text in, one score per label out.
pub trait LabelScorer: Send + Sync {
    fn scores(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}

pub struct GenreClassifier {
    scorer: Box<dyn LabelScorer>,
}

impl GenreClassifier {
    pub fn new(scorer: Box<dyn LabelScorer>) -> Self {
        Self { scorer }
    }

    /// Pick the highest-scoring genre. Equal scores resolve to the genre
    /// with the lowest ordinal.
    pub fn classify(&self, text: &str) -> Result<Genre, InferenceError> {
        let scores = self.scorer.scores(text)?;
        if scores.len() != Genre::COUNT {
            return Err(InferenceError::Output(format!(
                "classifier produced {} scores, expected {}",
                scores.len(),
                Genre::COUNT
            )));
        }

        let best = argmax(&scores)
            .ok_or_else(|| InferenceError::Output("classifier scores are all NaN".to_string()))?;
        let genre = Genre::from_ordinal(best)
            .ok_or_else(|| InferenceError::Output(format!("no genre at ordinal {}", best)))?;

        log::debug!("classified query as {genre} (score {})", scores[best]);
        Ok(genre)
    }
}
