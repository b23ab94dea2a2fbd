//! Immutable routing data built once at boot: the set of forwarded paths and the
//! single backend they are forwarded to.
use std::{collections::BTreeSet, fmt};

/// Normalised base URL of the downstream backend.
///
/// Trailing slashes are stripped so that `target + path` never yields `//`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    base: String,
}

impl BackendTarget {
    pub fn new(base: impl AsRef<str>) -> Self {
        Self {
            base: base.as_ref().trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Absolute URL for a request path, taken exactly as received.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Like [`BackendTarget::join`], appending `?query` when one is given and non-empty.
    pub fn join_with_query(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base, path, q),
            _ => self.join(path),
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

/// Deduplicated set of forwarded path patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    paths: BTreeSet<String>,
}

impl RouteTable {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for RouteTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
