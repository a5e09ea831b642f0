//! Header filters applied to genuine acknowledgements before they are stored.

use crate::core::Headers;

/// Default prefix marking a header as internal-only.
pub const DEFAULT_INTERNAL_PREFIX: &str = "internal-";

/// Strips metadata that must not leak into an aggregated result.
///
/// Implementations must be pure.
pub trait HeaderFilter: Send + Sync {
    fn filter(&self, headers: &Headers) -> Headers;
}

impl<F> HeaderFilter for F
where
    F: Fn(&Headers) -> Headers + Send + Sync,
{
    fn filter(&self, headers: &Headers) -> Headers {
        self(headers)
    }
}

/// Keeps every header.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl HeaderFilter for PassThrough {
    fn filter(&self, headers: &Headers) -> Headers {
        headers.clone()
    }
}

/// Drops headers whose key starts with a prefix or appears in a deny-list.
#[derive(Debug, Clone)]
pub struct InternalHeaderFilter {
    prefix: String,
    denied: Vec<String>,
}

impl InternalHeaderFilter {
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_INTERNAL_PREFIX.to_string(),
            denied: Vec::new(),
        }
    }

    /// Replace the internal prefix. An empty prefix disables prefix matching.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn deny(mut self, key: impl Into<String>) -> Self {
        self.denied.push(key.into());
        self
    }

    fn is_internal(&self, key: &str) -> bool {
        (!self.prefix.is_empty() && key.starts_with(&self.prefix))
            || self.denied.iter().any(|d| d == key)
    }
}

impl Default for InternalHeaderFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderFilter for InternalHeaderFilter {
    fn filter(&self, headers: &Headers) -> Headers {
        let mut filtered = headers.clone();
        filtered.retain(|key, _| !self.is_internal(key));
        filtered
    }
}
