//! # Stagehand
//!
//! Reliable correlation and multi-stage execution of commands owned by a
//! single entity (a connection, a thing, a policy).
//!
//! ## Core Concepts
//!
//! Two mechanisms, usable together or apart:
//! - [`AcknowledgementAggregator`] = fan-in. One request, several parties that
//!   must each confirm it, one merged [`Acknowledgements`] result.
//! - [`StagedCommand`] = sequencing. One command, an ordered queue of
//!   [`ConnectionAction`]s, driven one step at a time.
//!
//! The key principle: **nothing here blocks the owner**. Timeouts are
//! represented by eagerly created placeholders, and workflows that wait on a
//! collaborator are handed back to the owner's mailbox once the reply is in.
//!
//! ## Architecture
//!
//! ```text
//! Command handler
//!     │ map command ─► [Action, Action, ...]
//!     ▼
//! StagedCommand ──submit()──► WorkflowEngine (one task per owner)
//!                                  │
//!                                  ├─► ActionInterpreter.interpret(ctx, action)
//!                                  │        │
//!                                  │        ├─ Continue ─► advance() ─┐
//!                                  │        └─ Await ────► reply ─────┤
//!                                  │                                  │
//!                                  └◄─────── re-submit to self ◄──────┘
//!
//! Request fanned out to N parties
//!     │ add_requests()          (placeholders created immediately)
//!     ▼
//! AckCollector ◄── AckSender ◄── parties
//!     │ all received, or timeout elapsed
//!     ▼
//! build_result() ─► Acknowledgements
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Placeholders are eager** - every requested label has a timeout entry
//!    from the start, so a result can always be built
//! 2. **First genuine acknowledgement wins** - later or unsolicited ones are
//!    dropped silently
//! 3. **Staged commands are values** - every operation returns a new instance
//! 4. **Strict FIFO per workflow** - an action starts only after the previous
//!    one completed, including any awaited reply
//! 5. **Exhaustion is loud** - advancing past the last action is an error
//!
//! ## Example
//!
//! ```ignore
//! use stagehand_core::{ConnectionAction::*, StagedCommand, WorkflowEngine};
//!
//! let handle = WorkflowEngine::builder(ctx, MyInterpreter::new(clients))
//!     .with_mailbox_capacity(32)
//!     .build()
//!     .start();
//!
//! let staged = StagedCommand::new(cmd, Some(event), response, [
//!     PersistAndApplyEvent,
//!     OpenConnection,
//!     UpdateSubscriptions,
//!     SendResponse,
//! ])
//! .with_sender_if_unset(reply_to);
//!
//! handle.submit(staged).await?;
//! ```

// Core modules
mod ack;
mod config;
mod context;
mod core;
mod engine;
mod error;
mod interpreter;
mod request;
mod staged;

// Re-export shared value types
pub use crate::core::{header_keys, AckStatus, Command, CorrelationId, EntityId, Headers};

// Re-export acknowledgement types
pub use ack::{
    AckCollector, AckSender, Acknowledgement, AcknowledgementAggregator, AcknowledgementLabel,
    AcknowledgementRequest, Acknowledgements, HeaderFilter, InternalHeaderFilter, PassThrough,
    DEFAULT_INTERNAL_PREFIX, TIMEOUT_ERROR_CODE,
};

// Re-export staged command types
pub use staged::{ActionQueue, ConnectionAction, ReplyTo, StagedCommand};

// Re-export workflow context types
pub use context::{
    AcceptAll, CommandValidator, ConnectionLogger, ConnectionLoggerRegistry, LogCategory,
    LogEntry, LogLevel, WorkflowContext,
};

// Re-export engine types (primary entry point)
pub use engine::{WorkflowEngine, WorkflowEngineBuilder, WorkflowHandle};
pub use interpreter::{ActionEffect, ActionInterpreter};

// Re-export request helpers
pub use request::{ask_with_timeout, DEFAULT_REQUEST_TIMEOUT};

// Re-export configuration
pub use config::{AckConfig, EngineConfig, LoggingConfig};

// Re-export error types
pub use crate::error::{Error, Result, ValidationError};

// Re-export commonly used external types
pub use futures::future::BoxFuture;
