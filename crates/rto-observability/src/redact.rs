//! Redaction of sensitive fields in JSON payloads before they are logged or
//! stored in the audit trail.

use serde_json::Value;

/// Replacement written in place of a sensitive value.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEYS: [&str; 9] = [
    "password",
    "token",
    "secret",
    "authorization",
    "api_key",
    "refresh_token",
    "access_token",
    "content_base64",
    "apikey",
];

/// Whether a key names a credential or other value that must not be kept.
/// Matching is case-insensitive on substrings, so `new_password` and
/// `X-Api-Key` both match.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase().replace('-', "_");
    SENSITIVE_KEYS.iter().any(|s| key.contains(s))
}

/// Returns a copy of `value` with every sensitive key's value replaced,
/// recursing through objects and arrays.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_json(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_keys() {
        assert!(is_sensitive_key("password"));
        assert!(is_sensitive_key("currentPassword"));
        assert!(is_sensitive_key("X-Api-Key"));
        assert!(is_sensitive_key("client_secret"));
        assert!(!is_sensitive_key("title"));
        assert!(!is_sensitive_key("email"));
    }

    #[test]
    fn test_nested_redaction() {
        let body = json!({
            "email": "jo@example.com",
            "password": "hunter2",
            "items": [{"refresh_token": "abc", "name": "keep"}],
            "upload": {"file_name": "a.pdf", "content_base64": "AAAA"}
        });

        let redacted = redact_json(&body);
        assert_eq!(redacted["email"], "jo@example.com");
        assert_eq!(redacted["password"], REDACTED);
        assert_eq!(redacted["items"][0]["refresh_token"], REDACTED);
        assert_eq!(redacted["items"][0]["name"], "keep");
        assert_eq!(redacted["upload"]["content_base64"], REDACTED);
        assert_eq!(redacted["upload"]["file_name"], "a.pdf");
    }

    #[test]
    fn test_sensitive_object_is_replaced_whole() {
        let redacted = redact_json(&json!({"token": {"value": "x"}}));
        assert_eq!(redacted, json!({"token": REDACTED}));
    }
}
