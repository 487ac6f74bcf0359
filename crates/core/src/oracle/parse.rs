//! Lenient extraction of JSON objects from model output.

use super::RawDecision;
use crate::error::OracleError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fenced_block() -> Option<&'static Regex> {
    static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
    FENCED
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

fn bare_object() -> Option<&'static Regex> {
    static OBJECT: OnceLock<Option<Regex>> = OnceLock::new();
    OBJECT
        .get_or_init(|| Regex::new(r"(?s)\{.*\}").ok())
        .as_ref()
}

/// Find the first JSON object in `text`: the whole text, a fenced block, or
/// the outermost braces.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(captures) = fenced_block().and_then(|re| re.captures(trimmed)) {
        if let Ok(value) = serde_json::from_str::<Value>(&captures[1]) {
            return Some(value);
        }
    }

    bare_object()
        .and_then(|re| re.find(trimmed))
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter(Value::is_object)
}

/// Parse `{"action": ..., "rationale": ...}` out of free text
pub fn parse_decision(text: &str) -> Result<RawDecision, OracleError> {
    let value = extract_json(text)
        .ok_or_else(|| OracleError::Malformed("no JSON object in decision".to_string()))?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let rationale = value
        .get("rationale")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(RawDecision { action, rationale })
}
