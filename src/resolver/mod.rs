//! Dataref and directive resolution.
//!
//! This module turns the loosely typed names and property bags of the host
//! scene into checked values: full dataref paths for bones and show/hide
//! clauses, and typed per-element directives.

pub mod attributes;
pub mod registry;

pub use attributes::{ElementAttributes, SideBand};
pub use registry::{DatarefEntry, DatarefRegistry, Lookup};

use crate::error::StructuralError;
use crate::scene::Properties;
use crate::types::base_name;

/// A name split into its leaf and optional array index: `foo[3]` -> (`foo`, 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatarefName<'a> {
    pub full: &'a str,
    pub leaf: &'a str,
    pub index: Option<usize>,
}

impl<'a> DatarefName<'a> {
    pub fn parse(name: &'a str) -> Self {
        let full = base_name(name);
        match full.split_once('[') {
            Some((leaf, rest)) => Self {
                full,
                leaf,
                index: rest.trim_end_matches(']').parse().ok(),
            },
            None => Self {
                full,
                leaf: full,
                index: None,
            },
        }
    }
}

/// Resolve a bone or clause name to a full dataref path.
///
/// An explicit string property named after the bone (with or without its
/// index) wins. A value ending in `/` is a prefix the leaf is appended to.
/// Names that already contain `/` are taken as paths. Everything else is
/// looked up in the registry by leaf.
pub fn resolve_dataref(
    name: &str,
    properties: &Properties,
    registry: &DatarefRegistry,
) -> Result<String, StructuralError> {
    let parsed = DatarefName::parse(name);
    let suffix = parsed.index.map(|i| format!("[{}]", i)).unwrap_or_default();

    for key in [parsed.full, parsed.leaf] {
        if let Some(value) = properties.string(key)? {
            let value = value.trim();
            let path = if value.ends_with('/') {
                format!("{}{}", value, parsed.leaf)
            } else {
                value.to_string()
            };
            return Ok(if path.contains('[') {
                path
            } else {
                format!("{}{}", path, suffix)
            });
        }
    }

    if parsed.leaf.contains('/') {
        return Ok(parsed.full.to_string());
    }

    match registry.lookup(parsed.leaf) {
        Lookup::Found(entry) => {
            if let Some(index) = parsed.index {
                if entry.arity <= 1 || index >= entry.arity {
                    return Err(StructuralError::IndexOutOfRange {
                        path: entry.path.clone(),
                        index,
                        arity: entry.arity,
                    });
                }
            }
            Ok(format!("{}{}", entry.path, suffix))
        }
        Lookup::Ambiguous(count) => Err(StructuralError::AmbiguousDataref {
            leaf: parsed.leaf.to_string(),
            count,
        }),
        Lookup::Missing => Err(StructuralError::UnknownDataref(parsed.leaf.to_string())),
    }
}
