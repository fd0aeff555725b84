//! Tolerant parsing of model output.
//!
//! Models wrap answers in markdown fences even when told not to. Every
//! generation step goes through these helpers instead of parsing directly.

use serde_json::Value;

/// Remove a surrounding markdown code fence (with or without a language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag line, if any.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse JSON out of model output, returning `fallback` when it is not JSON.
pub fn parse_json_or(text: &str, fallback: Value) -> Value {
    serde_json::from_str(strip_code_fence(text)).unwrap_or(fallback)
}

/// Follow-up questions as either `{"follow_up_questions": [...]}` or a bare
/// array of strings.
pub fn parse_follow_ups(text: &str) -> Option<Vec<String>> {
    let value = parse_json_or(text, Value::Null);
    let list = match &value {
        Value::Object(map) => map.get("follow_up_questions")?,
        Value::Array(_) => &value,
        _ => return None,
    };

    list.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
