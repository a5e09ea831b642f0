//! Error types for acknowledgement aggregation and staged execution.
//!
//! Every failure here is local and synchronous. Nothing in this crate retries;
//! the layer that drives workflows decides what a failure means for the
//! original caller.

use std::time::Duration;

use crate::core::CorrelationId;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the aggregator, the staged command engine and the
/// workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A constructor received an empty or malformed identifying argument.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: String,
    },

    /// An acknowledgement label did not match the allowed format.
    #[error("invalid acknowledgement label <{label}>: expected 3-165 characters of [A-Za-z0-9-_:]")]
    InvalidLabel { label: String },

    /// `build_result` was called with headers bound to another request.
    #[error("correlation id mismatch: aggregator expects <{expected}>, headers carry <{actual}>")]
    CorrelationMismatch {
        expected: CorrelationId,
        actual: String,
    },

    /// `current_action` or `advance` was called on an exhausted staged command.
    #[error("staged command has no remaining actions")]
    EmptyActionQueue,

    /// A collaborator did not answer within the allotted time.
    #[error("request timed out after {timeout:?}")]
    RequestTimeout { timeout: Duration },

    /// The owning workflow engine has stopped accepting staged commands.
    #[error("workflow mailbox is closed")]
    MailboxClosed,

    /// The recipient of a response has gone away.
    #[error("reply channel is closed")]
    ReplyChannelClosed,

    /// A command was rejected by the entity's validator.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// Rejection produced by a [`CommandValidator`](crate::CommandValidator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("command validation failed: {message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
