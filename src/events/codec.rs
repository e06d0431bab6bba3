//! Recursive payload sanitizer: key redaction, size guard, and depth guard.
//!
//! Every payload passes through [`sanitize`] before it is persisted. The codec
//! never fails; anything it cannot represent becomes a best-effort string.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::Settings;

use super::{DEPTH_LIMIT, REDACTED_MARKER, TRUNCATED_MARKER};

/// Convert any serializable value into a `serde_json::Value`, falling back to
/// a descriptive string when serialization fails (non-string map keys, custom
/// serializers that refuse).
pub fn to_value_lossy<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)))
}

/// Sanitize a payload tree for storage.
///
/// Rules, applied recursively:
/// - mapping entries whose key matches the sensitive set (case-insensitive) are
///   replaced with [`REDACTED_MARKER`] before any recursion into that branch;
/// - strings longer than `max_field_bytes` are cut and suffixed with
///   [`TRUNCATED_MARKER`];
/// - values nested deeper than [`DEPTH_LIMIT`] are replaced with
///   [`TRUNCATED_MARKER`]; a value at exactly the limit is fully processed.
pub fn sanitize(value: &Value, settings: &Settings) -> Value {
    sanitize_at(value, settings, 0)
}

fn sanitize_at(value: &Value, settings: &Settings, depth: usize) -> Value {
    if depth > DEPTH_LIMIT {
        return Value::String(TRUNCATED_MARKER.to_string());
    }

    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(s) => sanitize_string(s, settings),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_at(item, settings, depth + 1))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                if settings.redact && is_sensitive_key(key, settings) {
                    // Redaction short-circuits: the branch is never traversed.
                    out.insert(key.clone(), Value::String(REDACTED_MARKER.to_string()));
                } else {
                    out.insert(key.clone(), sanitize_at(val, settings, depth + 1));
                }
            }
            Value::Object(out)
        }
    }
}

fn sanitize_string(s: &str, settings: &Settings) -> Value {
    if s.len() <= settings.max_field_bytes {
        return Value::String(s.to_string());
    }
    // Cut on a char boundary at or below the byte budget.
    let mut cut = settings.max_field_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}{}", &s[..cut], TRUNCATED_MARKER))
}

fn is_sensitive_key(key: &str, settings: &Settings) -> bool {
    settings
        .redact_keys
        .iter()
        .any(|k| k.eq_ignore_ascii_case(key))
}

/// Sanitize a command-line argument vector for the RUN_START payload.
///
/// Tokens are preserved verbatim, except `--key=value` tokens whose key
/// (dashes stripped, `-` folded to `_`) matches the sensitive set: there only
/// the value portion is replaced, keeping the flag readable.
pub fn sanitize_argv(argv: &[String], settings: &Settings) -> Value {
    if !settings.redact {
        return Value::Array(argv.iter().cloned().map(Value::String).collect());
    }
    Value::Array(
        argv.iter()
            .map(|token| Value::String(sanitize_argv_token(token, settings)))
            .collect(),
    )
}

fn sanitize_argv_token(token: &str, settings: &Settings) -> String {
    let Some((flag, _value)) = token.split_once('=') else {
        return token.to_string();
    };
    if !flag.starts_with('-') {
        return token.to_string();
    }
    let key = flag.trim_start_matches('-').replace('-', "_");
    if is_sensitive_key(&key, settings) {
        format!("{}={}", flag, REDACTED_MARKER)
    } else {
        token.to_string()
    }
}
