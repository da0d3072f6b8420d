//! Pull JSON out of free-form model replies.
//!
//! Models wrap JSON in prose or code fences; these helpers take the widest
//! bracketed (or braced) span and try to parse it. Callers decide the fallback.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

static ARRAY_BLOCK: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static OBJECT_BLOCK: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn first_match<'a>(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
    text: &'a str,
) -> Option<&'a str> {
    let re = cell.get_or_init(|| Regex::new(pattern)).as_ref().ok()?;
    re.find(text).map(|m| m.as_str())
}

/// First `[` through last `]`, parsed as a JSON array
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    let block = first_match(&ARRAY_BLOCK, r"\[[\s\S]*\]", text)?;
    match serde_json::from_str::<Value>(block).ok()? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// First `{` through last `}`, parsed as a JSON object
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let block = first_match(&OBJECT_BLOCK, r"\{[\s\S]*\}", text)?;
    match serde_json::from_str::<Value>(block).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
