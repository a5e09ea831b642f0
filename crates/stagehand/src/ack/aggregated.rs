use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ack::acknowledgement::Acknowledgement;
use crate::ack::label::AcknowledgementLabel;
use crate::core::{AckStatus, EntityId, Headers};

/// Fan-outs are usually a handful of labels; keep them inline.
type Entries = SmallVec<[Acknowledgement; 4]>;

/// The merged outcome of one aggregation, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgements {
    entity_id: EntityId,
    headers: Headers,
    entries: Entries,
}

impl Acknowledgements {
    pub fn empty(entity_id: EntityId, headers: Headers) -> Self {
        Self {
            entity_id,
            headers,
            entries: Entries::new(),
        }
    }

    pub(crate) fn from_entries(
        entity_id: EntityId,
        headers: Headers,
        entries: impl IntoIterator<Item = Acknowledgement>,
    ) -> Self {
        Self {
            entity_id,
            headers,
            entries: entries.into_iter().collect(),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Acknowledgement> {
        self.entries.iter()
    }

    pub fn get(&self, label: &AcknowledgementLabel) -> Option<&Acknowledgement> {
        self.entries.iter().find(|ack| ack.label() == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &AcknowledgementLabel> {
        self.entries.iter().map(Acknowledgement::label)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Acknowledgement> {
        self.entries.iter().filter(|ack| !ack.is_success())
    }

    pub fn timed_out(&self) -> impl Iterator<Item = &Acknowledgement> {
        self.entries.iter().filter(|ack| ack.is_timeout())
    }

    /// Overall status: a single entry speaks for itself, otherwise any
    /// failure turns the whole result into a failed dependency.
    pub fn status(&self) -> AckStatus {
        match self.entries.as_slice() {
            [] => AckStatus::OK,
            [only] => only.status(),
            entries if entries.iter().all(Acknowledgement::is_success) => AckStatus::OK,
            _ => AckStatus::FAILED_DEPENDENCY,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.entries.iter().all(Acknowledgement::is_success)
    }
}

impl<'a> IntoIterator for &'a Acknowledgements {
    type Item = &'a Acknowledgement;
    type IntoIter = std::slice::Iter<'a, Acknowledgement>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(label: &str, status: AckStatus) -> Acknowledgement {
        Acknowledgement::new(
            AcknowledgementLabel::parse(label).unwrap(),
            EntityId::parse("E").unwrap(),
            status,
            Headers::new(),
            None,
        )
    }

    fn result(entries: Vec<Acknowledgement>) -> Acknowledgements {
        Acknowledgements::from_entries(EntityId::parse("E").unwrap(), Headers::new(), entries)
    }

    #[test]
    fn test_status_rules() {
        assert_eq!(result(vec![]).status(), AckStatus::OK);
        assert_eq!(
            result(vec![ack("one", AckStatus::BAD_REQUEST)]).status(),
            AckStatus::BAD_REQUEST
        );
        assert_eq!(
            result(vec![ack("one", AckStatus::OK), ack("two", AckStatus::NO_CONTENT)]).status(),
            AckStatus::OK
        );
        assert_eq!(
            result(vec![ack("one", AckStatus::OK), ack("two", AckStatus::REQUEST_TIMEOUT)])
                .status(),
            AckStatus::FAILED_DEPENDENCY
        );
    }

    #[test]
    fn test_lookup_and_partitions() {
        let acks = result(vec![
            ack("one", AckStatus::OK),
            ack("two", AckStatus::REQUEST_TIMEOUT),
            ack("three", AckStatus::INTERNAL_SERVER_ERROR),
        ]);
        let two = AcknowledgementLabel::parse("two").unwrap();

        assert_eq!(acks.get(&two).unwrap().status(), AckStatus::REQUEST_TIMEOUT);
        assert_eq!(acks.failed().count(), 2);
        assert_eq!(acks.timed_out().count(), 1);
        assert!(!acks.is_successful());
        assert_eq!(
            acks.labels().map(|l| l.as_str()).collect::<Vec<_>>(),
            vec!["one", "two", "three"]
        );
    }
}
