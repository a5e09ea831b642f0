//! Staged command execution: an ordered, immutable queue of actions carried
//! alongside the command that needs them.

mod action;
mod command;
mod queue;

pub use action::ConnectionAction;
pub use command::{ReplyTo, StagedCommand};
pub use queue::ActionQueue;
