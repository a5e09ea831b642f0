use std::fmt;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::WorkflowContext;
use crate::core::Command;
use crate::staged::{ConnectionAction, StagedCommand};

/// What the engine should do after an action has been interpreted.
pub enum ActionEffect<C, E, R> {
    /// The action finished synchronously; advance now.
    Continue(StagedCommand<C, E, R>),
    /// The action waits on a collaborator. The future resolves, with the
    /// staged command to advance, once the collaborator replied, failed or
    /// timed out.
    Await(BoxFuture<'static, StagedCommand<C, E, R>>),
    /// Abandon the remaining actions of this workflow.
    Stop { reason: String },
    /// Stop the owning entity once in-flight workflows have finished.
    Passivate,
}

impl<C, E, R> ActionEffect<C, E, R> {
    /// Wrap a future for [`ActionEffect::Await`].
    pub fn awaiting<F>(future: F) -> Self
    where
        F: std::future::Future<Output = StagedCommand<C, E, R>> + Send + 'static,
    {
        ActionEffect::Await(future.boxed())
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        ActionEffect::Stop {
            reason: reason.into(),
        }
    }
}

impl<C: Command, E, R> fmt::Debug for ActionEffect<C, E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionEffect::Continue(staged) => f.debug_tuple("Continue").field(staged).finish(),
            ActionEffect::Await(_) => f.write_str("Await(..)"),
            ActionEffect::Stop { reason } => f.debug_struct("Stop").field("reason", reason).finish(),
            ActionEffect::Passivate => f.write_str("Passivate"),
        }
    }
}

/// Entity-specific meaning of each [`ConnectionAction`].
///
/// Called only from the engine task, one action at a time, so `&mut self`
/// state needs no locking. Implementations must not block; anything that
/// waits goes into [`ActionEffect::Await`].
pub trait ActionInterpreter<C, E, R>: Send + 'static {
    fn interpret(
        &mut self,
        ctx: &WorkflowContext<C>,
        action: ConnectionAction,
        staged: StagedCommand<C, E, R>,
    ) -> ActionEffect<C, E, R>;
}
