//! Label and confidence formatting for terminal output

/// Confidence the delta is reported against
pub const CONFIDENCE_BASELINE: f64 = 50.0;

/// Label decorated with its emoji; unknown labels are returned unchanged
#[must_use]
pub fn emoji_label(emotion: &str) -> String {
    let emoji = match emotion {
        "Angry" => "😡",
        "Disgust" => "🤢",
        "Fear" => "😱",
        "Happy" => "😄",
        "Sad" => "😢",
        "Surprise" => "😲",
        "Neutral" => "😐",
        _ => return emotion.to_string(),
    };
    format!("{emotion} {emoji}")
}

/// Percentage as received; whole numbers keep a trailing `.0`
#[must_use]
pub fn format_confidence(confidence: f64) -> String {
    format!("{confidence:?}%")
}

/// Signed distance from the 50% baseline, one decimal
#[must_use]
pub fn format_delta(confidence: f64) -> String {
    format!("{:.1}%", confidence - CONFIDENCE_BASELINE)
}

/// Whether the label earns a celebration line
#[must_use]
pub fn is_celebration(emotion: &str) -> bool {
    emotion.contains("Happy")
}
