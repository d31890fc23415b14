use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Scheduler dimensions keyed by name.
///
/// Keys are unique. Merging is first-write-wins: [`Dimensions::insert`] never
/// replaces a value that is already present, so required dimensions added
/// first always survive user-supplied ones.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimensions(BTreeMap<String, String>);

impl Dimensions {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Insert a dimension unless the key is already present.
    ///
    /// Returns `true` if the pair was added.
    pub fn insert<K, V>(&mut self, key: K, val: V) -> bool
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        if self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, val.into());
        true
    }

    /// Insert or overwrite a dimension.
    ///
    /// Used while collecting user input, where a later flag replaces an earlier one.
    pub fn set<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), val.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Add every entry of `other` whose key is not yet present.
    pub fn merge_absent(&mut self, other: &Dimensions) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    /// Iterate through all dimensions as `(&str, &str)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Wire representation: a sequence of key/value pairs.
    pub fn to_pairs(&self) -> Vec<KeyValue> {
        self.iter().map(KeyValue::from).collect()
    }

    /// Every dimension rendered as a `key:value` tag.
    pub fn to_tags(&self) -> Vec<String> {
        self.to_pairs().iter().map(KeyValue::to_tag).collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Dimensions
where
    K: Into<String>,
    V: Into<String>,
{
    /// Collects with first-write-wins semantics.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dims = Dimensions::new();
        for (k, v) in iter {
            dims.insert(k, v);
        }
        dims
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tags().join(", "))
    }
}
