//! Tunables for the engine, acknowledgement aggregation and connection logs.
//!
//! All structs deserialize with defaults for missing fields; durations are
//! written as integer milliseconds.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ack::{AcknowledgementAggregator, InternalHeaderFilter, DEFAULT_INTERNAL_PREFIX};
use crate::core::{CorrelationId, EntityId};
use crate::request::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound of the engine's inbox of staged commands.
    pub mailbox_capacity: usize,
    /// Handed to interpreters as [`WorkflowContext::request_timeout`].
    ///
    /// [`WorkflowContext::request_timeout`]: crate::WorkflowContext::request_timeout
    #[serde(with = "millis")]
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AckConfig {
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// Headers starting with this prefix never reach an aggregated result.
    pub internal_header_prefix: String,
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            internal_header_prefix: DEFAULT_INTERNAL_PREFIX.to_string(),
        }
    }
}

impl AckConfig {
    /// An empty aggregator using this timeout and an internal header filter.
    pub fn aggregator(
        &self,
        entity_id: EntityId,
        correlation_id: CorrelationId,
    ) -> AcknowledgementAggregator {
        let filter = InternalHeaderFilter::new().prefix(self.internal_header_prefix.clone());
        AcknowledgementAggregator::from_parts(entity_id, correlation_id, self.timeout, Arc::new(filter))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Entries kept per connection logger before the oldest is evicted.
    pub capacity: usize,
    /// How long logging stays enabled when no explicit end is given.
    #[serde(with = "millis")]
    pub default_duration: Duration,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            default_duration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
