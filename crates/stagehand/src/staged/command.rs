//! A command bundled with the actions still needed to process it.
//!
//! `StagedCommand` is a value: every operation returns a new instance and
//! leaves the receiver untouched, so an intermediate state can be queued,
//! logged or asserted on without affecting any other.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::core::{Command, Headers};
use crate::error::{Error, Result};
use crate::staged::action::ConnectionAction;
use crate::staged::queue::ActionQueue;

/// Recipient of the response a workflow eventually produces.
///
/// Compared by identity, not by channel.
pub struct ReplyTo<R> {
    id: Uuid,
    tx: mpsc::UnboundedSender<R>,
}

impl<R> ReplyTo<R> {
    pub fn new(tx: mpsc::UnboundedSender<R>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// A fresh recipient and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<R>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn reply(&self, response: R) -> Result<()> {
        self.tx.send(response).map_err(|_| Error::ReplyChannelClosed)
    }
}

impl<R> Clone for ReplyTo<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<R> PartialEq for ReplyTo<R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<R> Eq for ReplyTo<R> {}

impl<R> fmt::Debug for ReplyTo<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReplyTo").field(&self.id).finish()
    }
}

/// An in-flight command together with its remaining workflow.
///
/// - `command` is the original request.
/// - `event` is the state change some actions persist or apply.
/// - `response` is what the sender is eventually told.
/// - `sender` is set at most once.
pub struct StagedCommand<C, E, R> {
    command: Arc<C>,
    event: Option<Arc<E>>,
    response: Arc<R>,
    sender: Option<ReplyTo<R>>,
    actions: ActionQueue,
}

impl<C: Command, E, R> StagedCommand<C, E, R> {
    pub fn new(command: C, event: Option<E>, response: R, actions: impl Into<ActionQueue>) -> Self {
        Self {
            command: Arc::new(command),
            event: event.map(Arc::new),
            response: Arc::new(response),
            sender: None,
            actions: actions.into(),
        }
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    pub fn event(&self) -> Option<&E> {
        self.event.as_deref()
    }

    pub fn response(&self) -> &R {
        &self.response
    }

    pub fn sender(&self) -> Option<&ReplyTo<R>> {
        self.sender.as_ref()
    }

    pub fn remaining_actions(&self) -> &ActionQueue {
        &self.actions
    }

    /// The next action, without consuming it.
    pub fn current_action(&self) -> Result<ConnectionAction> {
        self.actions.peek().ok_or(Error::EmptyActionQueue)
    }

    pub fn has_more(&self) -> bool {
        !self.actions.is_empty()
    }

    /// A new staged command with the current action removed.
    ///
    /// Advancing an exhausted command is an error rather than a no-op, so a
    /// double advance shows up instead of silently skipping work.
    pub fn advance(&self) -> Result<Self> {
        let actions = self.actions.pop().ok_or(Error::EmptyActionQueue)?;
        Ok(Self {
            actions,
            ..self.clone()
        })
    }

    /// Record `sender` unless one is already recorded.
    pub fn with_sender_if_unset(&self, sender: ReplyTo<R>) -> Self {
        if self.sender.is_some() {
            return self.clone();
        }
        Self {
            sender: Some(sender),
            ..self.clone()
        }
    }

    pub fn with_response(&self, response: R) -> Self {
        Self {
            response: Arc::new(response),
            ..self.clone()
        }
    }

    pub fn with_event(&self, event: E) -> Self {
        Self {
            event: Some(Arc::new(event)),
            ..self.clone()
        }
    }

    /// Propagate caller headers onto the wrapped command only.
    pub fn with_headers(&self, headers: Headers) -> Self {
        Self {
            command: Arc::new(self.command.with_headers(headers)),
            ..self.clone()
        }
    }
}

impl<C: Command, E, R: Clone> StagedCommand<C, E, R> {
    /// Send the current response to the recorded sender, if any.
    pub fn deliver_response(&self) -> Result<()> {
        let Some(sender) = &self.sender else {
            debug!(
                command = self.command.name(),
                entity_id = %self.command.entity_id(),
                "no sender recorded, dropping response"
            );
            return Ok(());
        };
        sender.reply(R::clone(&self.response))
    }
}

impl<C, E, R> Clone for StagedCommand<C, E, R> {
    fn clone(&self) -> Self {
        Self {
            command: Arc::clone(&self.command),
            event: self.event.clone(),
            response: Arc::clone(&self.response),
            sender: self.sender.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<C: Command, E, R> fmt::Debug for StagedCommand<C, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedCommand")
            .field("command", &self.command.name())
            .field("entity_id", self.command.entity_id())
            .field("has_event", &self.event.is_some())
            .field("sender", &self.sender)
            .field("actions", &self.actions)
            .finish()
    }
}
