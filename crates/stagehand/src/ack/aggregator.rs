//! Collects acknowledgements for one outgoing request.
//!
//! Every requested label gets a synthetic timeout entry the moment it is
//! requested, so a result can be built at any time. The first genuine
//! acknowledgement per label replaces that entry; anything arriving for a
//! label that is not (or no longer) expected is dropped.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::ack::acknowledgement::Acknowledgement;
use crate::ack::aggregated::Acknowledgements;
use crate::ack::filter::HeaderFilter;
use crate::ack::label::{AcknowledgementLabel, AcknowledgementRequest};
use crate::core::{CorrelationId, EntityId, Headers};
use crate::error::{Error, Result};

/// Single-owner collector of acknowledgements for one correlation id.
///
/// Not synchronized: arrivals from several tasks must be funneled through the
/// owner, see [`AckCollector`](crate::AckCollector).
pub struct AcknowledgementAggregator {
    entity_id: EntityId,
    correlation_id: CorrelationId,
    timeout: Duration,
    header_filter: Arc<dyn HeaderFilter>,
    // insertion-ordered label -> latest acknowledgement
    acknowledgements: Vec<Acknowledgement>,
    positions: HashMap<AcknowledgementLabel, usize>,
    expected: BTreeSet<AcknowledgementLabel>,
}

impl AcknowledgementAggregator {
    /// Create an empty aggregator, validating the identifying arguments.
    pub fn new(
        entity_id: &str,
        correlation_id: &str,
        timeout: Duration,
        header_filter: Arc<dyn HeaderFilter>,
    ) -> Result<Self> {
        Ok(Self::from_parts(
            EntityId::parse(entity_id)?,
            CorrelationId::parse(correlation_id)?,
            timeout,
            header_filter,
        ))
    }

    /// Create an empty aggregator from already validated identifiers.
    pub fn from_parts(
        entity_id: EntityId,
        correlation_id: CorrelationId,
        timeout: Duration,
        header_filter: Arc<dyn HeaderFilter>,
    ) -> Self {
        Self {
            entity_id,
            correlation_id,
            timeout,
            header_filter,
            acknowledgements: Vec::new(),
            positions: HashMap::new(),
            expected: BTreeSet::new(),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Expect one acknowledgement for the request's label.
    pub fn add_request(&mut self, request: &AcknowledgementRequest) {
        let label = request.label().clone();
        let placeholder = Acknowledgement::timeout(
            label.clone(),
            self.entity_id.clone(),
            &self.correlation_id,
            self.timeout,
        );
        self.store(placeholder);
        self.expected.insert(label);
    }

    pub fn add_requests<'a>(&mut self, requests: impl IntoIterator<Item = &'a AcknowledgementRequest>) {
        for request in requests {
            self.add_request(request);
        }
    }

    /// Record a genuine acknowledgement.
    ///
    /// Returns `false` when the label is not expected, either because it was
    /// never requested or because it was already fulfilled. Such input is
    /// dropped without touching any state.
    pub fn add_received(&mut self, acknowledgement: Acknowledgement) -> bool {
        let label = acknowledgement.label();
        if !self.expected.contains(label) {
            debug!(
                correlation_id = %self.correlation_id,
                label = %label,
                "dropping acknowledgement that is not expected"
            );
            return false;
        }

        let filtered = acknowledgement.with_headers(self.header_filter.filter(acknowledgement.headers()));
        let label = filtered.label().clone();
        trace!(
            correlation_id = %self.correlation_id,
            label = %label,
            status = %filtered.status(),
            "acknowledgement received"
        );
        self.store(filtered);
        self.expected.remove(&label);
        true
    }

    /// True once no requested label is outstanding. Vacuously true when
    /// nothing was requested.
    pub fn all_received(&self) -> bool {
        self.expected.is_empty()
    }

    /// True when every requested label was genuinely and successfully
    /// acknowledged.
    pub fn is_successful(&self) -> bool {
        self.all_received() && self.acknowledgements.iter().all(Acknowledgement::is_success)
    }

    pub fn expected_labels(&self) -> impl Iterator<Item = &AcknowledgementLabel> {
        self.expected.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.expected.len()
    }

    pub fn requested_count(&self) -> usize {
        self.acknowledgements.len()
    }

    /// Build the aggregated result from whatever is known right now.
    ///
    /// Outstanding labels are reported through their timeout placeholders.
    /// `headers` must not carry a different correlation id.
    pub fn build_result(&self, headers: &Headers) -> Result<Acknowledgements> {
        if let Some(actual) = headers.correlation_id() {
            if actual != self.correlation_id.as_str() {
                return Err(Error::CorrelationMismatch {
                    expected: self.correlation_id.clone(),
                    actual: actual.to_string(),
                });
            }
        }

        let headers = headers.clone().with_correlation_id(&self.correlation_id);
        if self.acknowledgements.is_empty() {
            return Ok(Acknowledgements::empty(self.entity_id.clone(), headers));
        }
        Ok(Acknowledgements::from_entries(
            self.entity_id.clone(),
            headers,
            self.acknowledgements.iter().cloned(),
        ))
    }

    fn store(&mut self, acknowledgement: Acknowledgement) {
        match self.positions.get(acknowledgement.label()) {
            Some(&index) => self.acknowledgements[index] = acknowledgement,
            None => {
                self.positions
                    .insert(acknowledgement.label().clone(), self.acknowledgements.len());
                self.acknowledgements.push(acknowledgement);
            }
        }
    }
}

impl fmt::Debug for AcknowledgementAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcknowledgementAggregator")
            .field("entity_id", &self.entity_id)
            .field("correlation_id", &self.correlation_id)
            .field("timeout", &self.timeout)
            .field("acknowledgements", &self.acknowledgements)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}
