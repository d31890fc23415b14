use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Returns the key of a `key:value` tag: the text before the first `:`.
///
/// Tags without `:` have an empty key.
pub fn tag_prefix(tag: &str) -> &str {
    tag.split_once(':').map(|(k, _)| k).unwrap_or("")
}

/// Ordered list of `key:value` task tags, deduplicated by key prefix.
///
/// The first tag pushed for a given prefix wins; later tags with the same
/// prefix are dropped. Order of first appearance is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagList {
    tags: Vec<String>,
    seen: HashSet<String>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Append a tag unless a tag with the same prefix is already present.
    ///
    /// Returns `true` if the tag was added.
    pub fn push(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        let prefix = tag_prefix(&tag).to_string();
        if !self.seen.insert(prefix) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Append a `key:value` tag built from its parts.
    pub fn push_pair(&mut self, key: &str, value: &str) -> bool {
        self.push(format!("{key}:{value}"))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Value of the tag with the given key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| tag_prefix(t) == key && t.contains(':'))
            .and_then(|t| t.split_once(':'))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }
}

impl<S: Into<String>> Extend<S> for TagList {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for tag in iter {
            self.push(tag);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for TagList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = TagList::new();
        list.extend(iter);
        list
    }
}

impl From<Vec<String>> for TagList {
    fn from(tags: Vec<String>) -> Self {
        tags.into_iter().collect()
    }
}

impl From<TagList> for Vec<String> {
    fn from(list: TagList) -> Self {
        list.tags
    }
}
