//! Acknowledgement labels and the requests that name them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MIN_LABEL_LEN: usize = 3;
const MAX_LABEL_LEN: usize = 165;

/// Names one confirmation channel, i.e. who must confirm a request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AcknowledgementLabel(String);

impl AcknowledgementLabel {
    /// Confirms the twin change was persisted.
    pub const TWIN_PERSISTED: &'static str = "twin-persisted";
    /// Confirms a live message was answered.
    pub const LIVE_RESPONSE: &'static str = "live-response";
    /// Confirms the change reached the search index.
    pub const SEARCH_PERSISTED: &'static str = "search-persisted";

    const BUILTIN: [&'static str; 3] = [
        Self::TWIN_PERSISTED,
        Self::LIVE_RESPONSE,
        Self::SEARCH_PERSISTED,
    ];

    pub fn parse(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let valid_len = (MIN_LABEL_LEN..=MAX_LABEL_LEN).contains(&label.len());
        let valid_chars = label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
        if !valid_len || !valid_chars {
            return Err(Error::InvalidLabel { label });
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_builtin(&self) -> bool {
        Self::BUILTIN.contains(&self.0.as_str())
    }
}

impl fmt::Display for AcknowledgementLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AcknowledgementLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AcknowledgementLabel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<AcknowledgementLabel> for String {
    fn from(label: AcknowledgementLabel) -> Self {
        label.0
    }
}

/// Declares that one acknowledgement under `label` is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcknowledgementRequest {
    label: AcknowledgementLabel,
}

impl AcknowledgementRequest {
    pub fn new(label: AcknowledgementLabel) -> Self {
        Self { label }
    }

    pub fn parse(label: &str) -> Result<Self> {
        AcknowledgementLabel::parse(label).map(Self::new)
    }

    /// Parse a comma separated header value such as `requested-acks`.
    ///
    /// Blank segments are skipped and duplicates collapse onto their first
    /// occurrence.
    pub fn parse_list(value: &str) -> Result<Vec<Self>> {
        let mut requests: Vec<Self> = Vec::new();
        for segment in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let request = Self::parse(segment)?;
            if !requests.contains(&request) {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    pub fn label(&self) -> &AcknowledgementLabel {
        &self.label
    }
}

impl From<AcknowledgementLabel> for AcknowledgementRequest {
    fn from(label: AcknowledgementLabel) -> Self {
        Self::new(label)
    }
}

impl fmt::Display for AcknowledgementRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.label.fmt(f)
    }
}

impl FromStr for AcknowledgementRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_format() {
        assert!(AcknowledgementLabel::parse("L1x").is_ok());
        assert!(AcknowledgementLabel::parse("conn:custom_ack-1").is_ok());
        assert!(AcknowledgementLabel::parse("ab").is_err());
        assert!(AcknowledgementLabel::parse("has space").is_err());
        assert!(AcknowledgementLabel::parse("a".repeat(166)).is_err());
        assert!(AcknowledgementLabel::parse("a".repeat(165)).is_ok());
    }

    #[test]
    fn test_builtin_labels() {
        let label: AcknowledgementLabel = "twin-persisted".parse().unwrap();
        assert!(label.is_builtin());
        assert!(!AcknowledgementLabel::parse("my-ack").unwrap().is_builtin());
    }

    #[test]
    fn test_label_deserialize_validates() {
        let ok: AcknowledgementLabel = serde_json::from_str("\"live-response\"").unwrap();
        assert_eq!(ok.as_str(), "live-response");
        assert!(serde_json::from_str::<AcknowledgementLabel>("\"x\"").is_err());
    }

    #[test]
    fn test_parse_list_dedups_in_order() {
        let requests = AcknowledgementRequest::parse_list("b-ack, a-ack,,b-ack ,c-ack").unwrap();
        let labels: Vec<_> = requests.iter().map(|r| r.label().as_str()).collect();
        assert_eq!(labels, vec!["b-ack", "a-ack", "c-ack"]);

        assert!(AcknowledgementRequest::parse_list("ok-ack,no").is_err());
        assert!(AcknowledgementRequest::parse_list("").unwrap().is_empty());
    }
}
