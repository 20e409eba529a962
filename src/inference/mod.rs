//! Model backends and shared helpers for score vectors.

mod onnx;

pub use onnx::{OnnxClassifier, OnnxSpanScorer};

/// Index of the largest value. The first occurrence wins on ties and NaN
/// never wins. `None` when the slice is empty or all NaN.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        if best.map_or(true, |b| value > values[b]) {
            best = Some(idx);
        }
    }
    best
}
