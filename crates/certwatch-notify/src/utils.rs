//! Utility functions for notification channels

use serde_json::Value;

/// Maximum length of a response body kept in error messages and logs.
pub const MAX_BODY_LENGTH: usize = 4000;

/// Number of delivery attempts per recipient, including the first.
pub const SEND_ATTEMPTS: u32 = 3;

/// Backoff before retry `attempt` (zero-based): 100ms, 200ms, ...
pub fn retry_backoff(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_millis(100 * 2u64.pow(attempt))
}

/// Truncate a string to at most `max_len` bytes, respecting char boundaries.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Redact sensitive fields from JSON configuration
///
/// Replaces values for fields that commonly contain sensitive information:
/// - password, passwd, pwd
/// - token, secret
/// - api_key, apikey
/// - credentials
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                let is_sensitive = key_lower.contains("password")
                    || key_lower.contains("passwd")
                    || key_lower.contains("pwd")
                    || key_lower.contains("token")
                    || key_lower.contains("secret")
                    || key_lower.contains("api_key")
                    || key_lower.contains("apikey")
                    || key_lower.contains("credentials");

                if is_sensitive {
                    redacted.insert(key.clone(), Value::String("***".to_string()));
                } else if val.is_object() || val.is_array() {
                    redacted.insert(key.clone(), redact_sensitive_json(val));
                } else {
                    redacted.insert(key.clone(), val.clone());
                }
            }
            Value::Object(redacted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(redact_sensitive_json).collect()),
        _ => value.clone(),
    }
}
