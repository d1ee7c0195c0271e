//! Adaptive transcript reconciliation.
//!
//! Recognizers disagree on what a result batch contains. Some resend the
//! whole utterance so far in every alternative ("cumulative"), others send
//! one segment per alternative ("incremental"). The shape is detected per
//! batch from its last two alternatives.

use crate::domain::RecognitionAlternative;

/// A trailing interim alternative at least this long, relative to the one
/// before it, is read as a revision of the whole utterance.
const CUMULATIVE_LENGTH_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchShape {
    Cumulative,
    Incremental,
}

/// Classify a batch by its last two alternatives.
///
/// A batch is cumulative when the last alternative extends the one before it,
/// or when it is an interim result longer than 80% of its predecessor. The
/// length rule is never applied to a final last alternative, so a run of
/// final segments such as `["hello", "world"]` stays incremental.
pub fn classify(batch: &[RecognitionAlternative]) -> BatchShape {
    let [.., previous, last] = batch else {
        return BatchShape::Cumulative;
    };

    let previous_text = previous.transcript.trim().to_lowercase();
    let last_text = last.transcript.trim().to_lowercase();
    if last_text.starts_with(&previous_text) {
        return BatchShape::Cumulative;
    }

    // Heuristic: an interim result that is nearly as long as its predecessor
    // is a rewrite, not a new segment. Final segments never qualify.
    let previous_len = previous_text.chars().count() as f64;
    let last_len = last_text.chars().count() as f64;
    if !last.is_final && last_len > previous_len * CUMULATIVE_LENGTH_RATIO {
        return BatchShape::Cumulative;
    }

    BatchShape::Incremental
}

/// Text of the running recognizer session, as implied by `batch`.
pub fn reconcile(batch: &[RecognitionAlternative]) -> String {
    let Some(last) = batch.last() else {
        return String::new();
    };

    match classify(batch) {
        BatchShape::Cumulative => last.transcript.trim().to_string(),
        BatchShape::Incremental => {
            let finals: Vec<&str> = batch
                .iter()
                .filter(|alt| alt.is_final)
                .map(|alt| alt.transcript.trim())
                .filter(|text| !text.is_empty())
                .collect();
            if finals.is_empty() {
                last.transcript.trim().to_string()
            } else {
                finals.join(" ")
            }
        }
    }
}
