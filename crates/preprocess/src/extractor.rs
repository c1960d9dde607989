//! Query extraction from the AILA corpus
//!
//! Entries look like `AILA_Q12||<case text>` back to back. An entry's text runs
//! up to the next delimiter or end of input.

use crate::errors::PreprocessError;
use regex_lite::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

const DELIMITER_PATTERN: &str = r"AILA_Q\d+\|\|";

fn delimiter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DELIMITER_PATTERN).expect("delimiter pattern is valid"))
}

/// Case identifier to text, in first-occurrence order
///
/// Inserting an existing identifier replaces its text in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySet {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl QuerySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous text
    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) -> Option<String> {
        let id = id.into();
        let text = text.into();
        match self.index.get(&id) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, text)),
            None => {
                self.index.insert(id.clone(), self.entries.len());
                self.entries.push((id, text));
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.index.get(id).map(|&pos| self.entries[pos].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(id, text)| (id.as_str(), text.as_str()))
    }
}

impl Serialize for QuerySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, text) in &self.entries {
            map.serialize_entry(id, text)?;
        }
        map.end()
    }
}

struct QuerySetVisitor;

impl<'de> Visitor<'de> for QuerySetVisitor {
    type Value = QuerySet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of case identifier to text")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<QuerySet, A::Error> {
        let mut set = QuerySet::new();
        while let Some((id, text)) = access.next_entry::<String, String>()? {
            set.insert(id, text);
        }
        Ok(set)
    }
}

impl<'de> Deserialize<'de> for QuerySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(QuerySetVisitor)
    }
}

/// Extract every `AILA_Q<n>||` entry from corpus text
///
/// Text without delimiters yields an empty set. Later duplicates overwrite
/// earlier text.
pub fn extract_queries(corpus: &str) -> QuerySet {
    let mut queries = QuerySet::new();
    let delimiters: Vec<_> = delimiter().find_iter(corpus).collect();

    for (i, found) in delimiters.iter().enumerate() {
        let id = found.as_str().trim_end_matches("||");
        let end = delimiters.get(i + 1).map_or(corpus.len(), |next| next.start());
        let text = corpus[found.end()..end].trim();

        if queries.insert(id, text).is_some() {
            debug!(case_id = id, "Duplicate identifier, keeping later text");
        }
    }

    queries
}

/// Read a UTF-8 corpus file
pub fn read_corpus(path: &Path) -> Result<String, PreprocessError> {
    std::fs::read_to_string(path).map_err(|source| PreprocessError::Corpus {
        path: path.display().to_string(),
        source,
    })
}
