//! Cache key derivation.
//!
//! A key is the route template followed by either the record id or the
//! canonical text of the resolved query. Two requests that resolve to the same
//! record or the same validated query share a key regardless of parameter
//! order or ignored extras.

use std::fmt;

use crate::application::request::{ResolvedRequest, Target};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(request: &ResolvedRequest) -> Self {
        match &request.target {
            Target::Record(id) => Self(format!("{}:id={id}", request.route)),
            Target::Collection(query) => Self(format!("{}:{}", request.route, query.canonical())),
        }
    }

    /// Wrap an externally supplied key, e.g. one named by an operator.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
