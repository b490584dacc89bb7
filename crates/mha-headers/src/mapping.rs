// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative header → env / header → argument tables.

use http::{HeaderMap, HeaderName};
use std::collections::BTreeMap;

/// An ordered table of `(header, target)` pairs.
///
/// Entries keep their declaration order so that argument lists built from the
/// table are deterministic. Header names are case-insensitive; inserting a
/// header that is already present replaces its target in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMapping {
    entries: Vec<(HeaderName, String)>,
}

impl HeaderMapping {
    /// Create an empty mapping table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the target for `header`.
    pub fn insert(&mut self, header: HeaderName, target: impl Into<String>) {
        let target = target.into();
        match self.entries.iter_mut().find(|(h, _)| *h == header) {
            Some(entry) => entry.1 = target,
            None => self.entries.push((header, target)),
        }
    }

    /// Target declared for `header`, if any.
    pub fn get(&self, header: &HeaderName) -> Option<&str> {
        self.entries
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, t)| t.as_str())
    }

    /// Iterate entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &str)> {
        self.entries.iter().map(|(h, t)| (h, t.as_str()))
    }

    /// Number of declared entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no entries are declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(HeaderName, String)> for HeaderMapping {
    fn from_iter<I: IntoIterator<Item = (HeaderName, String)>>(iter: I) -> Self {
        let mut mapping = HeaderMapping::new();
        for (header, target) in iter {
            mapping.insert(header, target);
        }
        mapping
    }
}

/// Environment overrides and extra arguments derived from one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedHeaders {
    /// Environment variable overrides keyed by variable name.
    pub env: BTreeMap<String, String>,
    /// `--name value` pairs, flattened, in mapping declaration order.
    pub args: Vec<String>,
}

impl MappedHeaders {
    /// Returns `true` when no header produced any override.
    pub fn is_empty(&self) -> bool {
        self.env.is_empty() && self.args.is_empty()
    }
}

/// Apply both mapping tables to a request's headers.
///
/// A mapped header contributes only when the request carries it with a
/// non-empty value; the first value wins when the header repeats. Values are
/// forwarded verbatim (each argument value is a single argv element, never
/// re-tokenized).
pub fn map_headers(
    headers: &HeaderMap,
    env_mapping: &HeaderMapping,
    arg_mapping: &HeaderMapping,
) -> MappedHeaders {
    let mut out = MappedHeaders::default();

    for (header, env_name) in env_mapping.iter() {
        if let Some(value) = header_value(headers, header) {
            out.env.insert(env_name.to_string(), value);
        }
    }

    for (header, arg_name) in arg_mapping.iter() {
        if let Some(value) = header_value(headers, header) {
            out.args.push(format!("--{arg_name}"));
            out.args.push(value);
        }
    }

    out
}

pub(crate) fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let raw = headers.get(name)?.as_bytes();
    if raw.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(raw).into_owned())
}
