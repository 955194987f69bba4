use std::collections::BTreeMap;

/// Upper bound of the normalized score.
pub const SCORE_CEILING: f64 = 10.0;

/// Collapse per-field confidences into a single 0-10 score rounded to one decimal.
///
/// Values above 1 are read as percentages. Non-finite values are ignored, and an empty (or
/// entirely non-finite) input yields `None`: missing data is not a confidence of zero.
pub fn normalize(scores: &BTreeMap<String, f64>) -> Option<f64> {
    let normalized: Vec<f64> = scores
        .values()
        .copied()
        .filter(|value| value.is_finite())
        .map(|value| if value > 1.0 { value / 100.0 } else { value })
        .collect();

    if normalized.is_empty() {
        return None;
    }

    let mean = normalized.iter().sum::<f64>() / normalized.len() as f64;
    let scaled = (mean * SCORE_CEILING).clamp(0.0, SCORE_CEILING);
    Some((scaled * 10.0).round() / 10.0)
}

pub fn normalize_optional(scores: Option<&BTreeMap<String, f64>>) -> Option<f64> {
    scores.and_then(normalize)
}
