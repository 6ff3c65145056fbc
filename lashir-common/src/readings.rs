//! Pitch detector output parsing
//!
//! The external detector returns its readings as one opaque text blob. Seen in
//! practice:
//! - Python list repr from the command-line detector: `['C4', 'E4', 'G♯4']`
//!   (numpy 2 prints `[np.str_('C4'), ...]`)
//! - JSON body from the HTTP detector: `{"pitches": ["C4", "E4"]}`
//! - JSON arrays of names or frequencies: `["A4", 261.63]`
//! - Bare whitespace/comma separated tokens: `C4 E4 G4`
//!
//! Tokens are returned in order and unvalidated; classification happens later
//! so one bad token never discards the rest of a chunk.

use crate::{Error, Result};
use serde_json::Value;

/// Split a detector blob into ordered reading tokens
///
/// # Errors
/// [`Error::MalformedReadings`] when the blob opens a list or object that it
/// never closes, or is a JSON object without a `pitches` array.
pub fn parse_readings(blob: &str) -> Result<Vec<String>> {
    let trimmed = blob.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| Error::MalformedReadings(format!("invalid JSON object: {}", e)))?;
        let pitches = value
            .get("pitches")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedReadings("missing \"pitches\" array".to_string()))?;
        return json_tokens(pitches);
    }

    if trimmed.starts_with('[') {
        if !trimmed.ends_with(']') {
            return Err(Error::MalformedReadings("unterminated list".to_string()));
        }
        if let Ok(values) = serde_json::from_str::<Vec<Value>>(trimmed) {
            return json_tokens(&values);
        }
        return Ok(split_tokens(&trimmed[1..trimmed.len() - 1]));
    }

    Ok(split_tokens(trimmed))
}

fn json_tokens(values: &[Value]) -> Result<Vec<String>> {
    let mut tokens = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::String(s) if !s.trim().is_empty() => tokens.push(s.trim().to_string()),
            Value::String(_) => {}
            Value::Number(n) => tokens.push(n.to_string()),
            // Unvoiced frames
            Value::Null => {}
            other => {
                return Err(Error::MalformedReadings(format!(
                    "unexpected reading value: {}",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

fn split_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .map(|token| strip_constructor(token.trim()))
        .map(|token| token.trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// `np.str_('C4')` -> `'C4'`, `np.float64(440.0)` -> `440.0`
fn strip_constructor(token: &str) -> &str {
    let Some(open) = token.find('(') else {
        return token;
    };
    let prefix = &token[..open];
    let is_constructor = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if is_constructor && token.ends_with(')') {
        &token[open + 1..token.len() - 1]
    } else {
        token
    }
}
