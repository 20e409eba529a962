//! Extractive question answering over a synopsis.

use serde::{Deserialize, Serialize};

use crate::errors::InferenceError;
use crate::inference::argmax;

/// Per-token output of an extractive QA model for one packed
/// `question, context` input.
#[derive(Debug, Clone, Default)]
pub struct SpanScores {
    pub input_ids: Vec<u32>,
    pub start_logits: Vec<f32>,
    pub end_logits: Vec<f32>,
}

/// An extractive QA model together with its tokenizer.
pub trait SpanScorer: Send + Sync {
    fn score(&self, question: &str, context: &str) -> Result<SpanScores, InferenceError>;

    /// Turn token ids back into text.
    fn decode(&self, ids: &[u32]) -> Result<String, InferenceError>;
}

/// How start/end positions are chosen from the logits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanDecoding {
    /// Start and end are independent argmaxes. `end < start` yields an
    /// empty answer.
    #[default]
    Independent,
    /// Best `start[i] + end[j]` with `i <= j`.
    Joint,
}

pub struct ExtractiveAnswerer {
    scorer: Box<dyn SpanScorer>,
    decoding: SpanDecoding,
}

impl ExtractiveAnswerer {
    pub fn new(scorer: Box<dyn SpanScorer>, decoding: SpanDecoding) -> Self {
        Self { scorer, decoding }
    }

    pub fn decoding(&self) -> SpanDecoding {
        self.decoding
    }

    pub fn answer(&self, question: &str, context: &str) -> Result<String, InferenceError> {
        let scores = self.scorer.score(question, context)?;
        let len = scores.input_ids.len();
        if scores.start_logits.len() != len || scores.end_logits.len() != len {
            return Err(InferenceError::Output(format!(
                "logit lengths {}/{} do not match {} input tokens",
                scores.start_logits.len(),
                scores.end_logits.len(),
                len
            )));
        }

        let (start, end) = match self.decoding {
            SpanDecoding::Independent => independent_span(&scores.start_logits, &scores.end_logits),
            SpanDecoding::Joint => joint_span(&scores.start_logits, &scores.end_logits),
        }
        .ok_or_else(|| InferenceError::Output("empty or NaN span logits".to_string()))?;

        if end < start {
            log::warn!("malformed answer span: end {end} precedes start {start}");
            return Ok(String::new());
        }

        let answer = self.scorer.decode(&scores.input_ids[start..=end])?;
        Ok(answer.trim().to_string())
    }
}

/// `(argmax(start), argmax(end))` with no ordering constraint.
pub fn independent_span(start_logits: &[f32], end_logits: &[f32]) -> Option<(usize, usize)> {
    Some((argmax(start_logits)?, argmax(end_logits)?))
}

/// Maximize `start[i] + end[j]` over `i <= j` in one pass by carrying the
/// best start seen so far.
pub fn joint_span(start_logits: &[f32], end_logits: &[f32]) -> Option<(usize, usize)> {
    let mut best_start: Option<usize> = None;
    let mut best: Option<(usize, usize, f32)> = None;

    for (j, &end) in end_logits.iter().enumerate() {
        let Some(&start) = start_logits.get(j) else {
            break;
        };
        if !start.is_nan() && best_start.map_or(true, |i| start > start_logits[i]) {
            best_start = Some(j);
        }
        let Some(i) = best_start else {
            continue;
        };
        let total = start_logits[i] + end;
        if total.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, _, s)| total > s) {
            best = Some((i, j, total));
        }
    }

    best.map(|(i, j, _)| (i, j))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Whitespace "tokenizer": ids index into `tokens`.
    struct FakeQa {
        tokens: Vec<String>,
        start_logits: Vec<f32>,
        end_logits: Vec<f32>,
    }

    impl FakeQa {
        fn new(text: &str, start: usize, end: usize) -> Self {
            let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
            let mut start_logits = vec![0.0; tokens.len()];
            let mut end_logits = vec![0.0; tokens.len()];
            start_logits[start] = 5.0;
            end_logits[end] = 5.0;
            Self {
                tokens,
                start_logits,
                end_logits,
            }
        }
    }

    impl SpanScorer for FakeQa {
        fn score(&self, _question: &str, _context: &str) -> Result<SpanScores, InferenceError> {
            Ok(SpanScores {
                input_ids: (0..self.tokens.len() as u32).collect(),
                start_logits: self.start_logits.clone(),
                end_logits: self.end_logits.clone(),
            })
        }

        fn decode(&self, ids: &[u32]) -> Result<String, InferenceError> {
            Ok(ids
                .iter()
                .map(|&id| self.tokens[id as usize].as_str())
                .collect::<Vec<_>>()
                .join(" "))
        }
    }

    const PACKED: &str = "[CLS] who leads the crew ? [SEP] captain dallas leads the nostromo crew [SEP]";

    #[test]
    fn extracts_span_between_argmaxes() {
        let answerer =
            ExtractiveAnswerer::new(Box::new(FakeQa::new(PACKED, 7, 8)), SpanDecoding::Independent);
        assert_eq!(
            answerer.answer("who leads the crew?", "...").unwrap(),
            "captain dallas"
        );
    }

    #[test]
    fn reversed_span_is_empty_not_error() {
        let answerer =
            ExtractiveAnswerer::new(Box::new(FakeQa::new(PACKED, 9, 7)), SpanDecoding::Independent);
        assert_eq!(answerer.answer("q", "c").unwrap(), "");
    }

    #[test]
    fn joint_decoding_never_reverses() {
        let answerer =
            ExtractiveAnswerer::new(Box::new(FakeQa::new(PACKED, 9, 7)), SpanDecoding::Joint);
        let answer = answerer.answer("q", "c").unwrap();
        assert!(!answer.is_empty());
    }

    #[test]
    fn mismatched_logits_are_inference_failure() {
        let mut fake = FakeQa::new(PACKED, 7, 8);
        fake.end_logits.pop();
        let answerer = ExtractiveAnswerer::new(Box::new(fake), SpanDecoding::Independent);
        assert!(matches!(
            answerer.answer("q", "c"),
            Err(InferenceError::Output(_))
        ));
    }

    #[test]
    fn independent_span_uses_first_maximum() {
        assert_eq!(
            independent_span(&[1.0, 3.0, 3.0], &[2.0, 0.0, 2.0]),
            Some((1, 0))
        );
        assert_eq!(independent_span(&[], &[]), None);
    }

    #[test]
    fn joint_span_maximizes_ordered_pairs() {
        // independent would pick (2, 0)
        let start = [1.0, 0.0, 4.0];
        let end = [5.0, 0.0, 3.0];
        assert_eq!(joint_span(&start, &end), Some((2, 2)));

        let start = [3.0, 0.0, 0.0];
        let end = [0.0, 0.0, 2.0];
        assert_eq!(joint_span(&start, &end), Some((0, 2)));
    }

    #[test]
    fn decoding_policy_reads_from_yaml() {
        let joint: SpanDecoding = serde_yml::from_str("joint").unwrap();
        assert_eq!(joint, SpanDecoding::Joint);
        assert_eq!(SpanDecoding::default(), SpanDecoding::Independent);
    }
}
