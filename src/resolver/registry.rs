//! Known datarefs, looked up by their last path segment.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A dataref path and how many array elements it has (1 for scalars).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatarefEntry {
    pub path: String,
    #[serde(default = "scalar")]
    pub arity: usize,
}

fn scalar() -> usize {
    1
}

impl DatarefEntry {
    pub fn new(path: impl Into<String>, arity: usize) -> Self {
        Self {
            path: path.into(),
            arity,
        }
    }

    /// The last path segment.
    pub fn leaf(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Result of looking up a leaf name.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a DatarefEntry),
    Ambiguous(usize),
    Missing,
}

/// Registry of datarefs keyed by leaf.
#[derive(Debug, Clone, Default)]
pub struct DatarefRegistry {
    entries: Vec<DatarefEntry>,
    by_path: HashMap<String, usize>,
    by_leaf: HashMap<String, Vec<usize>>,
}

impl DatarefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataref. Re-registering the same path replaces its arity.
    pub fn insert(&mut self, entry: DatarefEntry) {
        if let Some(&existing) = self.by_path.get(&entry.path) {
            self.entries[existing].arity = entry.arity;
            return;
        }
        let index = self.entries.len();
        self.by_path.insert(entry.path.clone(), index);
        self.by_leaf
            .entry(entry.leaf().to_string())
            .or_default()
            .push(index);
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = DatarefEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    pub fn lookup(&self, leaf: &str) -> Lookup<'_> {
        match self.by_leaf.get(leaf).map(Vec::as_slice) {
            None | Some([]) => Lookup::Missing,
            Some([only]) => Lookup::Found(&self.entries[*only]),
            Some(many) => Lookup::Ambiguous(many.len()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the simulator's `DataRefs.txt`.
    ///
    /// Each data line is tab separated: path, type (`int`, `float[8]`, ...),
    /// writability, then free text. The version header and anything that
    /// does not look like a path are skipped.
    pub fn parse(text: &str) -> Self {
        let mut registry = Self::new();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let (Some(path), Some(kind)) = (fields.next(), fields.next()) else {
                continue;
            };
            if !path.contains('/') {
                continue;
            }
            registry.insert(DatarefEntry::new(path, parse_arity(kind)));
        }
        log::debug!("loaded {} datarefs", registry.len());
        registry
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }
}

fn parse_arity(kind: &str) -> usize {
    kind.split_once('[')
        .and_then(|(_, rest)| rest.trim_end_matches(']').parse().ok())
        .unwrap_or(1)
}
