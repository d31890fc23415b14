use serde::{Deserialize, Serialize};

/// Key–value pair as it travels on the wire (dimensions, build tags).
///
/// Both fields are plain UTF-8 strings with no validation applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    key: String,
    value: String,
}

impl KeyValue {
    /// Create a new key–value pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Split a `key:value` tag at the first `:`.
    ///
    /// A tag without `:` has an empty key and the whole text as value.
    pub fn from_tag(tag: &str) -> Self {
        match tag.split_once(':') {
            Some((k, v)) => Self::new(k.trim(), v.trim()),
            None => Self::new("", tag.trim()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Render as a `key:value` tag.
    pub fn to_tag(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }
}

impl From<(String, String)> for KeyValue {
    fn from((key, value): (String, String)) -> Self {
        Self { key, value }
    }
}

impl From<(&str, &str)> for KeyValue {
    fn from((key, value): (&str, &str)) -> Self {
        Self::new(key, value)
    }
}
