//! Access to incoming request parameters.

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value as JsonValue};

/// Read-only view of the request parameters.
pub trait Request {
    fn input(&self, key: &str) -> Option<&JsonValue>;

    fn has(&self, key: &str) -> bool {
        self.input(key).is_some()
    }

    /// String value of `key`; numbers and booleans are stringified.
    fn input_str(&self, key: &str) -> Option<String> {
        match self.input(key)? {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn input_i64(&self, key: &str) -> Option<i64> {
        match self.input(key)? {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Truthy in the loose sense request flags use: `1`, `true`, `yes`,
    /// `on`.
    fn input_flag(&self, key: &str) -> bool {
        match self.input(key) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            Some(JsonValue::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
            }
            _ => false,
        }
    }

    /// Entry `entry` of the map parameter `key` (`_operators[status]`).
    fn input_entry(&self, key: &str, entry: &str) -> Option<&JsonValue> {
        self.input(key)?.as_object()?.get(entry)
    }
}

/// Request parameters held as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonRequest {
    params: Map<String, JsonValue>,
}

impl JsonRequest {
    pub fn new(params: Map<String, JsonValue>) -> Self {
        Self { params }
    }

    pub fn from_value(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(params) => Self { params },
            _ => Self::default(),
        }
    }

    /// Parse a query string with bracket syntax: `a[]=1&a[]=2` builds an
    /// array, `m[k]=v` builds an object, a repeated plain key keeps the
    /// last value.
    pub fn from_query_string(query: &str) -> Self {
        let mut params = Map::new();
        let query = query.trim_start_matches('?');

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode(raw_key);
            let value = JsonValue::String(decode(raw_value));

            match key.split_once('[') {
                Some((base, rest)) if rest.ends_with(']') && !base.is_empty() => {
                    let inner = &rest[..rest.len() - 1];
                    if inner.is_empty() {
                        let slot = params
                            .entry(base.to_string())
                            .or_insert_with(|| JsonValue::Array(Vec::new()));
                        if !slot.is_array() {
                            *slot = JsonValue::Array(Vec::new());
                        }
                        if let JsonValue::Array(items) = slot {
                            items.push(value);
                        }
                    } else {
                        let slot = params
                            .entry(base.to_string())
                            .or_insert_with(|| JsonValue::Object(Map::new()));
                        if !slot.is_object() {
                            *slot = JsonValue::Object(Map::new());
                        }
                        if let JsonValue::Object(entries) = slot {
                            entries.insert(inner.to_string(), value);
                        }
                    }
                }
                _ => {
                    params.insert(key.clone(), value);
                }
            }
        }

        Self { params }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) -> &mut Self {
        self.params.insert(key.into(), value);
        self
    }
}

impl Request for JsonRequest {
    fn input(&self, key: &str) -> Option<&JsonValue> {
        self.params.get(key)
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_string_shapes() {
        let request = JsonRequest::from_query_string(
            "?_fields=name,category:id|title&status[]=open&status[]=closed&_operators[status]=!in&q=red+shoe%21",
        );
        assert_eq!(request.input("_fields"), Some(&json!("name,category:id|title")));
        assert_eq!(request.input("status"), Some(&json!(["open", "closed"])));
        assert_eq!(request.input_entry("_operators", "status"), Some(&json!("!in")));
        assert_eq!(request.input_str("q").as_deref(), Some("red shoe!"));
        assert!(!request.has("missing"));
    }

    #[test]
    fn test_flags_and_numbers() {
        let request = JsonRequest::from_value(json!({
            "_get_all": "true",
            "per_page": "25",
            "page": 3,
            "off": "0",
        }));
        assert!(request.input_flag("_get_all"));
        assert!(!request.input_flag("off"));
        assert!(!request.input_flag("missing"));
        assert_eq!(request.input_i64("per_page"), Some(25));
        assert_eq!(request.input_i64("page"), Some(3));
    }

    #[test]
    fn test_key_without_value() {
        let request = JsonRequest::from_query_string("with_trashed&a=1");
        assert_eq!(request.input("with_trashed"), Some(&json!("")));
        assert_eq!(request.input_str("a").as_deref(), Some("1"));
    }
}
