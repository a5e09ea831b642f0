//! Mailbox-driven execution of staged commands for one owning entity.
//!
//! ```text
//! submit() ──► mailbox ──┐
//!                        ▼
//!                 engine task ──► interpreter.interpret(action)
//!                        ▲            │
//!                        │            ├─ Continue ─► advance ─┐
//!                        │            ├─ Await ──► spawn ─────┤ (on reply)
//!                        │            ├─ Stop / Passivate     │
//!                        └──── internal inbox ◄───────────────┘
//! ```
//!
//! Each workflow runs its actions strictly in order: the next action is only
//! dequeued once the current one has completed, including any awaited reply.
//! Different workflows interleave freely while one of them is waiting.

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::WorkflowContext;
use crate::core::Command;
use crate::error::{Error, Result};
use crate::interpreter::{ActionEffect, ActionInterpreter};
use crate::staged::{ConnectionAction, StagedCommand};

enum Inbound<C, E, R> {
    Submit(StagedCommand<C, E, R>),
    Shutdown,
}

enum Internal<C, E, R> {
    /// The current action has completed; advance past it.
    Completed(StagedCommand<C, E, R>),
    /// An advanced workflow re-submitted to itself.
    Resubmit(StagedCommand<C, E, R>),
    /// The awaited future of `action` panicked; the workflow is abandoned.
    Failed {
        command: String,
        action: ConnectionAction,
    },
}

/// Builder for [`WorkflowEngine`].
pub struct WorkflowEngineBuilder<C, E, R, I> {
    ctx: WorkflowContext<C>,
    interpreter: I,
    config: EngineConfig,
    _marker: PhantomData<fn() -> (E, R)>,
}

impl<C, E, R, I> WorkflowEngineBuilder<C, E, R, I>
where
    C: Command,
    E: Send + Sync + 'static,
    R: Send + Sync + 'static,
    I: ActionInterpreter<C, E, R>,
{
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.config.mailbox_capacity = capacity;
        self
    }

    pub fn build(self) -> WorkflowEngine<C, E, R, I> {
        WorkflowEngine {
            ctx: self.ctx,
            interpreter: self.interpreter,
            config: self.config,
            _marker: PhantomData,
        }
    }
}

/// Runs staged commands for one owner until shut down or passivated.
pub struct WorkflowEngine<C, E, R, I> {
    ctx: WorkflowContext<C>,
    interpreter: I,
    config: EngineConfig,
    _marker: PhantomData<fn() -> (E, R)>,
}

impl<C, E, R, I> WorkflowEngine<C, E, R, I>
where
    C: Command,
    E: Send + Sync + 'static,
    R: Send + Sync + 'static,
    I: ActionInterpreter<C, E, R>,
{
    pub fn builder(ctx: WorkflowContext<C>, interpreter: I) -> WorkflowEngineBuilder<C, E, R, I> {
        WorkflowEngineBuilder {
            ctx,
            interpreter,
            config: EngineConfig::default(),
            _marker: PhantomData,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the engine task on the current tokio runtime.
    pub fn start(self) -> WorkflowHandle<C, E, R> {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (in_flight_tx, in_flight_rx) = watch::channel(0usize);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let in_flight_tx = Arc::new(in_flight_tx);

        let task = EngineTask {
            ctx: self.ctx.with_request_timeout(self.config.request_timeout),
            interpreter: self.interpreter,
            mailbox: mailbox_rx,
            internal_tx,
            internal_rx,
            in_flight: Arc::clone(&in_flight_tx),
            closing: false,
            drained: false,
        };
        tokio::spawn(async move {
            task.run().await;
            let _ = stopped_tx.send(true);
        });

        WorkflowHandle {
            mailbox: mailbox_tx,
            in_flight_tx,
            in_flight: in_flight_rx,
            stopped: stopped_rx,
        }
    }
}

struct EngineTask<C, E, R, I> {
    ctx: WorkflowContext<C>,
    interpreter: I,
    mailbox: mpsc::Receiver<Inbound<C, E, R>>,
    internal_tx: mpsc::UnboundedSender<Internal<C, E, R>>,
    internal_rx: mpsc::UnboundedReceiver<Internal<C, E, R>>,
    in_flight: Arc<watch::Sender<usize>>,
    closing: bool,
    /// The mailbox is closed, empty and has no outstanding send permits.
    drained: bool,
}

impl<C, E, R, I> EngineTask<C, E, R, I>
where
    C: Command,
    E: Send + Sync + 'static,
    R: Send + Sync + 'static,
    I: ActionInterpreter<C, E, R>,
{
    async fn run(mut self) {
        debug!(owner_id = %self.ctx.owner_id(), "workflow engine started");
        loop {
            if self.drained && *self.in_flight.borrow() == 0 {
                break;
            }

            tokio::select! {
                Some(internal) = self.internal_rx.recv() => match internal {
                    Internal::Completed(staged) => self.complete(staged),
                    Internal::Resubmit(staged) => self.execute(staged),
                    Internal::Failed { command, action } => {
                        warn!(
                            owner_id = %self.ctx.owner_id(),
                            %command,
                            %action,
                            "awaited action panicked, abandoning workflow"
                        );
                        self.finish();
                    }
                },
                // Submits that won a permit before the close still arrive here.
                inbound = self.mailbox.recv(), if !self.drained => match inbound {
                    Some(Inbound::Submit(staged)) => self.execute(staged),
                    Some(Inbound::Shutdown) => self.begin_closing("shutdown requested"),
                    None => {
                        self.drained = true;
                        self.begin_closing("mailbox closed");
                    }
                },
            }
        }
        debug!(owner_id = %self.ctx.owner_id(), "workflow engine stopped");
    }

    fn execute(&mut self, staged: StagedCommand<C, E, R>) {
        let action = match staged.current_action() {
            Ok(action) => action,
            Err(_) => {
                warn!(
                    owner_id = %self.ctx.owner_id(),
                    command = staged.command().name(),
                    "discarding staged command without actions"
                );
                self.finish();
                return;
            }
        };

        let command = staged.command().name().to_string();
        let remaining = staged.remaining_actions().len();
        debug!(
            owner_id = %self.ctx.owner_id(),
            %command,
            correlation_id = staged.command().headers().correlation_id().unwrap_or_default(),
            %action,
            remaining,
            "executing action"
        );

        match self.interpreter.interpret(&self.ctx, action, staged) {
            ActionEffect::Continue(staged) => self.complete(staged),
            ActionEffect::Await(reply) => {
                let internal_tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let internal = match AssertUnwindSafe(reply).catch_unwind().await {
                        Ok(staged) => Internal::Completed(staged),
                        Err(_) => Internal::Failed { command, action },
                    };
                    let _ = internal_tx.send(internal);
                });
            }
            ActionEffect::Stop { reason } => {
                warn!(owner_id = %self.ctx.owner_id(), %action, %reason, "workflow stopped");
                self.finish();
            }
            ActionEffect::Passivate => {
                if remaining > 1 {
                    debug!(
                        owner_id = %self.ctx.owner_id(),
                        %command,
                        remaining = remaining - 1,
                        "skipping actions queued after passivation"
                    );
                }
                self.finish();
                self.begin_closing("passivated");
            }
        }
    }

    fn complete(&mut self, staged: StagedCommand<C, E, R>) {
        match staged.advance() {
            Ok(next) if next.has_more() => {
                let _ = self.internal_tx.send(Internal::Resubmit(next));
            }
            Ok(_) => self.finish(),
            Err(err) => {
                warn!(owner_id = %self.ctx.owner_id(), error = %err, "cannot advance workflow");
                self.finish();
            }
        }
    }

    fn finish(&self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }

    fn begin_closing(&mut self, reason: &str) {
        if self.closing {
            return;
        }
        info!(owner_id = %self.ctx.owner_id(), reason, "workflow engine closing");
        self.closing = true;
        self.mailbox.close();
    }
}

/// Cloneable handle for submitting staged commands to a running engine.
pub struct WorkflowHandle<C, E, R> {
    mailbox: mpsc::Sender<Inbound<C, E, R>>,
    in_flight_tx: Arc<watch::Sender<usize>>,
    in_flight: watch::Receiver<usize>,
    stopped: watch::Receiver<bool>,
}

impl<C, E, R> WorkflowHandle<C, E, R> {
    /// Hand a staged command to the engine.
    ///
    /// Waits for mailbox capacity. Dropping the returned future before it
    /// completes leaves the engine untouched.
    pub async fn submit(&self, staged: StagedCommand<C, E, R>) -> Result<()> {
        let permit = self
            .mailbox
            .reserve()
            .await
            .map_err(|_| Error::MailboxClosed)?;
        self.in_flight_tx.send_modify(|n| *n += 1);
        permit.send(Inbound::Submit(staged));
        Ok(())
    }

    /// Number of submitted workflows that have not finished yet.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until every submitted workflow has finished.
    pub async fn settled(&self) {
        let mut in_flight = self.in_flight.clone();
        let _ = in_flight.wait_for(|n| *n == 0).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Stop accepting work, let in-flight workflows drain, and wait for the
    /// engine to stop.
    pub async fn shutdown(&self) {
        let _ = self.mailbox.send(Inbound::Shutdown).await;
        self.stopped().await;
    }

    /// Wait for the engine to stop, e.g. after passivation.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        let _ = stopped.wait_for(|s| *s).await;
    }
}

impl<C, E, R> Clone for WorkflowHandle<C, E, R> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
            in_flight_tx: Arc::clone(&self.in_flight_tx),
            in_flight: self.in_flight.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::context::{AcceptAll, ConnectionLogger, ConnectionLoggerRegistry};
    use crate::core::{EntityId, Headers};
    use crate::staged::ConnectionAction::{self, *};

    #[derive(Debug, Clone)]
    struct Ping {
        entity_id: EntityId,
        headers: Headers,
        name: &'static str,
    }

    impl Command for Ping {
        fn name(&self) -> &str {
            self.name
        }

        fn entity_id(&self) -> &EntityId {
            &self.entity_id
        }

        fn headers(&self) -> &Headers {
            &self.headers
        }

        fn with_headers(&self, headers: Headers) -> Self {
            Self {
                headers,
                ..self.clone()
            }
        }
    }

    type Staged = StagedCommand<Ping, (), String>;
    type Trace = Arc<Mutex<Vec<(&'static str, ConnectionAction)>>>;

    /// Records every action; `OpenConnection` waits 100ms, `Passivate`
    /// passivates, `TestConnection` stops the workflow,
    /// `RetrieveConnectionMetrics` panics while awaited and
    /// `RetrieveConnectionStatus` answers with the request timeout.
    struct Recorder {
        trace: Trace,
    }

    impl ActionInterpreter<Ping, (), String> for Recorder {
        fn interpret(
            &mut self,
            ctx: &WorkflowContext<Ping>,
            action: ConnectionAction,
            staged: Staged,
        ) -> ActionEffect<Ping, (), String> {
            self.trace.lock().unwrap().push((staged.command().name, action));
            match action {
                OpenConnection => ActionEffect::awaiting(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    staged.with_response("opened".to_string())
                }),
                TestConnection => ActionEffect::stop("test failed"),
                RetrieveConnectionMetrics => ActionEffect::awaiting(crash(staged)),
                RetrieveConnectionStatus => {
                    let timeout = format!("{:?}", ctx.request_timeout());
                    ActionEffect::Continue(staged.with_response(timeout))
                }
                Passivate => ActionEffect::Passivate,
                SendResponse => {
                    let _ = staged.deliver_response();
                    ActionEffect::Continue(staged)
                }
                _ => ActionEffect::Continue(staged),
            }
        }
    }

    async fn crash(staged: Staged) -> Staged {
        panic!("collaborator crashed while handling {}", staged.command().name)
    }

    fn context() -> WorkflowContext<Ping> {
        let owner = EntityId::parse("conn-1").unwrap();
        WorkflowContext::new(
            owner.clone(),
            Arc::new(ConnectionLoggerRegistry::default()),
            ConnectionLogger::always_on(owner, 10),
            Arc::new(AcceptAll),
        )
    }

    fn staged(name: &'static str, actions: Vec<ConnectionAction>) -> Staged {
        let ping = Ping {
            entity_id: EntityId::parse("conn-1").unwrap(),
            headers: Headers::new(),
            name,
        };
        StagedCommand::new(ping, None, "accepted".to_string(), actions)
    }

    fn start() -> (WorkflowHandle<Ping, (), String>, Trace) {
        start_with(EngineConfig {
            mailbox_capacity: 4,
            ..EngineConfig::default()
        })
    }

    fn start_with(config: EngineConfig) -> (WorkflowHandle<Ping, (), String>, Trace) {
        let trace = Trace::default();
        let recorder = Recorder {
            trace: Arc::clone(&trace),
        };
        let handle = WorkflowEngine::builder(context(), recorder)
            .with_config(config)
            .build()
            .start();
        (handle, trace)
    }

    #[tokio::test]
    async fn test_synchronous_actions_run_in_order_once() {
        let (handle, trace) = start();

        handle
            .submit(staged("a", vec![ApplyEvent, UpdateSubscriptions, SendResponse]))
            .await
            .unwrap();
        handle.settled().await;

        assert_eq!(
            *trace.lock().unwrap(),
            vec![("a", ApplyEvent), ("a", UpdateSubscriptions), ("a", SendResponse)]
        );
        assert_eq!(handle.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_awaited_action_does_not_block_other_workflows() {
        let (handle, trace) = start();
        let (reply_to, mut replies) = crate::staged::ReplyTo::channel();

        handle
            .submit(staged("slow", vec![OpenConnection, SendResponse]).with_sender_if_unset(reply_to))
            .await
            .unwrap();
        handle
            .submit(staged("fast", vec![ApplyEvent, SendResponse]))
            .await
            .unwrap();
        handle.settled().await;

        let trace = trace.lock().unwrap().clone();
        let slow: Vec<_> = trace.iter().filter(|(n, _)| *n == "slow").map(|(_, a)| *a).collect();
        assert_eq!(slow, vec![OpenConnection, SendResponse]);

        let fast_done = trace.iter().position(|e| *e == ("fast", SendResponse)).unwrap();
        let slow_done = trace.iter().position(|e| *e == ("slow", SendResponse)).unwrap();
        assert!(fast_done < slow_done);

        assert_eq!(replies.recv().await.unwrap(), "opened");
    }

    #[tokio::test]
    async fn test_stop_abandons_remaining_actions() {
        let (handle, trace) = start();

        handle
            .submit(staged("t", vec![TestConnection, SendResponse]))
            .await
            .unwrap();
        handle.settled().await;

        assert_eq!(*trace.lock().unwrap(), vec![("t", TestConnection)]);
    }

    #[tokio::test]
    async fn test_empty_workflow_is_discarded() {
        let (handle, trace) = start();

        handle.submit(staged("empty", vec![])).await.unwrap();
        handle.settled().await;

        assert!(trace.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_passivate_stops_engine() {
        let (handle, _trace) = start();

        handle
            .submit(staged("p", vec![SendResponse, Passivate]))
            .await
            .unwrap();
        handle.stopped().await;

        assert!(handle.is_stopped());
        assert!(matches!(
            handle.submit(staged("late", vec![SendResponse])).await,
            Err(Error::MailboxClosed)
        ));
        assert_eq!(handle.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_in_flight_workflows() {
        let (handle, trace) = start();

        handle
            .submit(staged("slow", vec![OpenConnection, SendResponse]))
            .await
            .unwrap();
        handle.shutdown().await;

        assert!(trace.lock().unwrap().contains(&("slow", SendResponse)));
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn test_abandoned_submit_on_full_mailbox_is_not_counted() {
        let (handle, trace) = start_with(EngineConfig {
            mailbox_capacity: 1,
            ..EngineConfig::default()
        });

        handle.submit(staged("first", vec![ApplyEvent])).await.unwrap();
        let second = handle.submit(staged("second", vec![ApplyEvent])).now_or_never();
        assert!(second.is_none());
        assert_eq!(handle.in_flight(), 1);

        tokio::time::timeout(Duration::from_secs(1), handle.settled())
            .await
            .expect("engine settles");
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("engine shuts down");
        assert_eq!(*trace.lock().unwrap(), vec![("first", ApplyEvent)]);
    }

    #[tokio::test]
    async fn test_panicking_await_abandons_only_its_workflow() {
        let (handle, trace) = start();

        handle
            .submit(staged("crash", vec![RetrieveConnectionMetrics, SendResponse]))
            .await
            .unwrap();
        handle.submit(staged("ok", vec![ApplyEvent])).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle.settled())
            .await
            .expect("engine settles");
        assert_eq!(handle.in_flight(), 0);

        let trace = trace.lock().unwrap().clone();
        assert!(trace.contains(&("ok", ApplyEvent)));
        assert!(!trace.contains(&("crash", SendResponse)));

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("engine shuts down");
    }

    #[tokio::test]
    async fn test_actions_after_passivate_never_run() {
        let (handle, trace) = start();

        handle
            .submit(staged("p", vec![Passivate, SendResponse, ApplyEvent]))
            .await
            .unwrap();
        handle.stopped().await;

        assert_eq!(*trace.lock().unwrap(), vec![("p", Passivate)]);
    }

    #[tokio::test]
    async fn test_configured_request_timeout_reaches_interpreter() {
        let (handle, _trace) = start_with(EngineConfig {
            request_timeout: Duration::from_millis(250),
            ..EngineConfig::default()
        });
        let (reply_to, mut replies) = crate::staged::ReplyTo::channel();

        handle
            .submit(
                staged("status", vec![RetrieveConnectionStatus, SendResponse])
                    .with_sender_if_unset(reply_to),
            )
            .await
            .unwrap();

        assert_eq!(replies.recv().await.unwrap(), "250ms");
    }
}
