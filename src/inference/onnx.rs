//! ONNX Runtime backends for the classifier and QA models.
//!
//! Both models are transformer encoders exported to ONNX with a Hugging Face
//! `tokenizer.json` next to them. Inputs are fed by name; `token_type_ids`
//! is only supplied when the exported graph declares it.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;

use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use tokenizers::{
    EncodeInput, Encoding, Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy,
};

use crate::answerer::{SpanScorer, SpanScores};
use crate::classifier::LabelScorer;
use crate::errors::{InferenceError, ResourceUnavailable};

const LOGITS: &str = "logits";
const START_LOGITS: &str = "start_logits";
const END_LOGITS: &str = "end_logits";

/// A loaded session plus the tokenizer that feeds it.
struct EncoderModel {
    /// run() requires &mut self
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    wants_token_types: bool,
}

impl EncoderModel {
    fn load(
        artifact: &'static str,
        model_path: &Path,
        tokenizer_path: &Path,
        max_input_tokens: usize,
    ) -> Result<Self, ResourceUnavailable> {
        let malformed = |path: &Path, reason: String| ResourceUnavailable::Malformed {
            artifact,
            path: path.to_path_buf(),
            reason,
        };

        let mut tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| malformed(tokenizer_path, e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_input_tokens,
                strategy: TruncationStrategy::LongestFirst,
                direction: TruncationDirection::Right,
                ..Default::default()
            }))
            .map_err(|e| malformed(tokenizer_path, e.to_string()))?;
        tokenizer.with_padding(None);

        let session = Session::builder()
            .map_err(|e| malformed(model_path, e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| malformed(model_path, e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| malformed(model_path, e.to_string()))?;

        let wants_token_types = session.inputs.iter().any(|i| i.name == "token_type_ids");

        log::debug!(
            "loaded {artifact} from {} (inputs: {:?})",
            model_path.display(),
            session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            wants_token_types,
        })
    }

    fn encode<'s, E: Into<EncodeInput<'s>>>(&self, input: E) -> Result<Encoding, InferenceError> {
        self.tokenizer
            .encode(input, true)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))
    }

    /// Run one encoding through the graph and copy out the named f32
    /// outputs, flattened.
    fn run(&self, encoding: &Encoding, outputs: &[&str]) -> Result<Vec<Vec<f32>>, InferenceError> {
        let to_i64 = |values: &[u32]| values.iter().map(|&v| v as i64).collect::<Vec<i64>>();
        let shape = vec![1i64, encoding.get_ids().len() as i64];

        let tensor = |name: &'static str, values: Vec<i64>| {
            Tensor::from_array((shape.clone(), values))
                .map(|t| (Cow::Borrowed(name), SessionInputValue::from(t)))
                .map_err(|e| InferenceError::Model(format!("tensor creation error: {e}")))
        };

        let mut inputs = vec![
            tensor("input_ids", to_i64(encoding.get_ids()))?,
            tensor("attention_mask", to_i64(encoding.get_attention_mask()))?,
        ];
        if self.wants_token_types {
            inputs.push(tensor("token_type_ids", to_i64(encoding.get_type_ids()))?);
        }

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Model(format!("session lock poisoned: {e}")))?;

        let results = session
            .run(inputs)
            .map_err(|e| InferenceError::Model(e.to_string()))?;

        let extracted = outputs
            .iter()
            .map(|name| {
                let value = results
                    .get(*name)
                    .ok_or_else(|| InferenceError::Output(format!("graph has no output '{name}'")))?;
                let (_shape, data) = value
                    .try_extract_tensor::<f32>()
                    .map_err(|e| InferenceError::Output(format!("{name}: {e}")))?;
                Ok(data.to_vec())
            })
            .collect::<Result<Vec<_>, InferenceError>>()?;
        Ok(extracted)
    }
}

/// Sequence classifier producing one logit per genre.
pub struct OnnxClassifier {
    model: EncoderModel,
}

impl OnnxClassifier {
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_input_tokens: usize,
    ) -> Result<Self, ResourceUnavailable> {
        Ok(Self {
            model: EncoderModel::load("genre classifier", model_path, tokenizer_path, max_input_tokens)?,
        })
    }
}

impl LabelScorer for OnnxClassifier {
    fn scores(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let encoding = self.model.encode(text)?;
        let mut outputs = self.model.run(&encoding, &[LOGITS])?;
        Ok(outputs.remove(0))
    }
}

/// Extractive QA model producing start and end logits per token.
pub struct OnnxSpanScorer {
    model: EncoderModel,
}

impl OnnxSpanScorer {
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_input_tokens: usize,
    ) -> Result<Self, ResourceUnavailable> {
        Ok(Self {
            model: EncoderModel::load("QA model", model_path, tokenizer_path, max_input_tokens)?,
        })
    }
}

impl SpanScorer for OnnxSpanScorer {
    fn score(&self, question: &str, context: &str) -> Result<SpanScores, InferenceError> {
        let encoding = self.model.encode((question, context))?;
        let mut outputs = self.model.run(&encoding, &[START_LOGITS, END_LOGITS])?;
        let end_logits = outputs.pop().unwrap_or_default();
        let start_logits = outputs.pop().unwrap_or_default();

        Ok(SpanScores {
            input_ids: encoding.get_ids().to_vec(),
            start_logits,
            end_logits,
        })
    }

    fn decode(&self, ids: &[u32]) -> Result<String, InferenceError> {
        // special tokens are kept, matching how the model's own pipeline decodes spans
        self.model
            .tokenizer
            .decode(ids, false)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_model_file_is_malformed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxClassifier::load(
            &dir.path().join("model.onnx"),
            &dir.path().join("tokenizer.json"),
            512,
        );
        match result {
            Err(err) => assert_eq!(err.artifact(), "genre classifier"),
            Ok(_) => panic!("loading from an empty directory should fail"),
        }
    }

    /// Needs an exported QA model under `REELQA_TEST_QA_DIR`.
    #[test]
    #[ignore = "requires model artifacts"]
    fn qa_model_extracts_answer() {
        let dir = PathBuf::from(std::env::var("REELQA_TEST_QA_DIR").unwrap());
        let scorer = OnnxSpanScorer::load(
            &dir.join("model.onnx"),
            &dir.join("tokenizer.json"),
            512,
        )
        .unwrap();
        let answerer = crate::answerer::ExtractiveAnswerer::new(
            Box::new(scorer),
            crate::answerer::SpanDecoding::Independent,
        );
        let answer = answerer
            .answer(
                "Who is the main character?",
                "Thomas Anderson, known as Neo, is a hacker who learns the world is a simulation.",
            )
            .unwrap();
        assert!(answer.to_lowercase().contains("neo") || answer.to_lowercase().contains("thomas"));
    }
}
