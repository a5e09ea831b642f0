//! Value types shared by the acknowledgement and staged command modules.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifier of the entity that owns a request (a connection, a thing, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Parse an entity id, rejecting blank input.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::invalid("entity_id", "must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token binding a request to every acknowledgement sent for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random correlation id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse a caller-supplied correlation id, rejecting empty input.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::invalid("correlation_id", "must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Header keys with a meaning inside this crate.
pub mod header_keys {
    pub const CORRELATION_ID: &str = "correlation-id";
    pub const ENTITY_ID: &str = "entity-id";
    pub const RESPONSE_REQUIRED: &str = "response-required";
    pub const TIMEOUT: &str = "timeout";
    pub const REQUESTED_ACKS: &str = "requested-acks";
}

/// Caller-visible metadata travelling with commands and acknowledgements.
///
/// Keys are kept sorted so two header maps with the same content compare and
/// print identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers holding nothing but the given correlation id.
    pub fn for_correlation(correlation_id: &CorrelationId) -> Self {
        Self::new().with_correlation_id(correlation_id)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.get(header_keys::CORRELATION_ID)
    }

    pub fn with_correlation_id(mut self, correlation_id: &CorrelationId) -> Self {
        self.insert(header_keys::CORRELATION_ID, correlation_id.as_str());
        self
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.0.retain(|k, v| keep(k, v));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// HTTP-style status reported by an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckStatus(u16);

impl AckStatus {
    pub const OK: AckStatus = AckStatus(200);
    pub const CREATED: AckStatus = AckStatus(201);
    pub const NO_CONTENT: AckStatus = AckStatus(204);
    pub const BAD_REQUEST: AckStatus = AckStatus(400);
    pub const REQUEST_TIMEOUT: AckStatus = AckStatus(408);
    pub const FAILED_DEPENDENCY: AckStatus = AckStatus(424);
    pub const INTERNAL_SERVER_ERROR: AckStatus = AckStatus(500);
    pub const SERVICE_UNAVAILABLE: AckStatus = AckStatus(503);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u16 {
        self.0
    }

    /// 2xx statuses count as success.
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An original request that can be carried through a staged workflow.
///
/// Commands are treated as immutable; the only permitted change is swapping in
/// headers updated by the caller.
pub trait Command: Clone + Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn entity_id(&self) -> &EntityId;

    fn headers(&self) -> &Headers;

    /// A copy of this command carrying `headers` instead of its own.
    fn with_headers(&self, headers: Headers) -> Self;
}
