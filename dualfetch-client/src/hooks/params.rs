//! URL joining and parameter shaping used by the standard before-request hook.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::ClientError;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Returns true for `http://` and `https://` URLs.
pub fn is_absolute(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Join two URL parts with exactly one slash between them.
pub fn join_path(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Resolve the final URL of a call.
///
/// Absolute URLs are used as-is. Relative URLs get `url_prefix` (when
/// `join_prefix` is set) and then `api_url` in front.
pub fn resolve_url(api_url: &str, url_prefix: &str, join_prefix: bool, url: &str) -> String {
    if is_absolute(url) {
        return url.to_string();
    }
    let path = if join_prefix {
        join_path(url_prefix, url)
    } else {
        url.to_string()
    };
    join_path(api_url, &path)
}

/// Trim strings and rewrite RFC 3339 timestamps as `YYYY-MM-DD HH:mm:ss`, recursively.
pub fn format_values(value: &mut Value) {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            *text = match DateTime::parse_from_rfc3339(trimmed) {
                Ok(timestamp) => timestamp.format(DATE_FORMAT).to_string(),
                Err(_) => trimmed.to_string(),
            };
        }
        Value::Array(items) => items.iter_mut().for_each(format_values),
        Value::Object(map) => map.values_mut().for_each(format_values),
        _ => {}
    }
}

/// [`format_values`] over every value of a map.
pub fn format_map(map: &mut Map<String, Value>) {
    map.values_mut().for_each(format_values);
}

/// Append `params` to `url` as a query string.
///
/// `null` values are dropped; nested objects and arrays use bracket notation.
pub fn append_query(url: &str, params: &Map<String, Value>) -> Result<String, ClientError> {
    let params: Map<String, Value> = params
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if params.is_empty() {
        return Ok(url.to_string());
    }
    let query = serde_qs::to_string(&params)
        .map_err(|e| ClientError::encode(format!("failed to encode query parameters: {e}")))?;
    if query.is_empty() {
        return Ok(url.to_string());
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    Ok(format!("{url}{separator}{query}"))
}
