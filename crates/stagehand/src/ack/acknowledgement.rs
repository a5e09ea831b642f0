use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ack::label::AcknowledgementLabel;
use crate::core::{AckStatus, CorrelationId, EntityId, Headers};

/// Error code carried in the payload of synthetic timeout acknowledgements.
pub const TIMEOUT_ERROR_CODE: &str = "acknowledgement:request.timeout";

/// A confirmation for one label, either received from a remote party or
/// synthesized locally to stand in for one that never arrived.
///
/// Immutable: [`with_headers`](Self::with_headers) returns a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    label: AcknowledgementLabel,
    entity_id: EntityId,
    status: AckStatus,
    headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl Acknowledgement {
    pub fn new(
        label: AcknowledgementLabel,
        entity_id: EntityId,
        status: AckStatus,
        headers: Headers,
        payload: Option<Value>,
    ) -> Self {
        Self {
            label,
            entity_id,
            status,
            headers,
            payload,
        }
    }

    /// Placeholder reported for `label` when no genuine acknowledgement
    /// arrives within `timeout`.
    pub fn timeout(
        label: AcknowledgementLabel,
        entity_id: EntityId,
        correlation_id: &CorrelationId,
        timeout: Duration,
    ) -> Self {
        let payload = json!({
            "status": AckStatus::REQUEST_TIMEOUT.code(),
            "error": TIMEOUT_ERROR_CODE,
            "message": format!(
                "The acknowledgement request reached the specified timeout of {}ms.",
                timeout.as_millis()
            ),
            "description": "Try increasing the timeout and make sure that the requested \
                acknowledgement is sent back in time.",
        });
        Self::new(
            label,
            entity_id,
            AckStatus::REQUEST_TIMEOUT,
            Headers::for_correlation(correlation_id),
            Some(payload),
        )
    }

    pub fn label(&self) -> &AcknowledgementLabel {
        &self.label
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn status(&self) -> AckStatus {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_timeout(&self) -> bool {
        self.status == AckStatus::REQUEST_TIMEOUT
    }

    pub fn with_headers(&self, headers: Headers) -> Self {
        Self {
            headers,
            ..self.clone()
        }
    }
}
