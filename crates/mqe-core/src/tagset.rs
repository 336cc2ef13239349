//! Tag sets: the unordered `name -> value` map that identifies a series.
//!
//! Backed by a `BTreeMap` so equality, hashing and the serialized form are
//! independent of insertion order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Union of both sets; on a shared key the value from `other` wins.
    pub fn merge(&self, other: &TagSet) -> TagSet {
        let mut merged = self.clone();
        for (k, v) in &other.0 {
            merged.0.insert(k.clone(), v.clone());
        }
        merged
    }

    /// True when every key present in both sets maps to the same value.
    pub fn agrees_with(&self, other: &TagSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .0
            .iter()
            .all(|(k, v)| large.0.get(k).map_or(true, |w| w == v))
    }

    /// Canonical `k=v,k=v` form with keys sorted; `=`, `,` and `\` are
    /// backslash-escaped.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i != 0 {
                out.push(',');
            }
            escape_into(&mut out, k);
            out.push('=');
            escape_into(&mut out, v);
        }
        out
    }

    /// Inverse of [`TagSet::serialize`]. Returns `None` on malformed input.
    /// The empty string parses to the empty set.
    pub fn parse(raw: &str) -> Option<TagSet> {
        let mut result = TagSet::new();
        if raw.is_empty() {
            return Some(result);
        }
        let mut chars = raw.chars();
        loop {
            let (key, sep) = read_component(&mut chars)?;
            if sep != Some('=') || key.is_empty() {
                return None;
            }
            let (value, sep) = read_component(&mut chars)?;
            if value.is_empty() {
                return None;
            }
            result.0.insert(key, value);
            match sep {
                None => return Some(result),
                Some(',') => continue,
                Some(_) => return None,
            }
        }
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, '=' | ',' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Read until an unescaped `=` or `,` (returned as the separator) or the end.
fn read_component(chars: &mut std::str::Chars<'_>) -> Option<(String, Option<char>)> {
    let mut buf = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                e @ ('=' | ',' | '\\') => buf.push(e),
                _ => return None,
            },
            '=' | ',' => return Some((buf, Some(c))),
            _ => buf.push(c),
        }
    }
    Some((buf, None))
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TagSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for TagSet {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
