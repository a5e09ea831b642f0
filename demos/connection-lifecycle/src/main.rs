//! # Connection Lifecycle Demo
//!
//! Drives connectivity commands through staged workflows. Opening a
//! connection fans out to every client, and each client must acknowledge
//! before the workflow moves on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use stagehand_core::{
    ask_with_timeout, AckCollector, AckConfig, AckSender, AckStatus, Acknowledgement,
    AcknowledgementLabel,
    AcknowledgementRequest, ActionEffect, ActionInterpreter, Command, CommandValidator,
    ConnectionAction::{self, *},
    ConnectionLogger, ConnectionLoggerRegistry, CorrelationId, EngineConfig, EntityId, Headers,
    LogCategory, LoggingConfig, ReplyTo, StagedCommand, ValidationError, WorkflowContext,
    WorkflowEngine,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Commands, Events, Responses
// ============================================================================

#[derive(Debug, Clone)]
enum Kind {
    Create { uri: String },
    Open,
    Close,
    Test { uri: String },
    RetrieveStatus,
    EnableLogs,
    RetrieveLogs,
    Delete,
}

#[derive(Debug, Clone)]
struct ConnectivityCommand {
    kind: Kind,
    entity_id: EntityId,
    headers: Headers,
}

impl ConnectivityCommand {
    fn new(entity_id: &EntityId, kind: Kind) -> Self {
        Self {
            kind,
            entity_id: entity_id.clone(),
            headers: Headers::for_correlation(&CorrelationId::new()),
        }
    }

    fn correlation_id(&self) -> Option<CorrelationId> {
        self.headers
            .correlation_id()
            .and_then(|id| CorrelationId::parse(id).ok())
    }
}

impl Command for ConnectivityCommand {
    fn name(&self) -> &str {
        match self.kind {
            Kind::Create { .. } => "create-connection",
            Kind::Open => "open-connection",
            Kind::Close => "close-connection",
            Kind::Test { .. } => "test-connection",
            Kind::RetrieveStatus => "retrieve-connection-status",
            Kind::EnableLogs => "enable-connection-logs",
            Kind::RetrieveLogs => "retrieve-connection-logs",
            Kind::Delete => "delete-connection",
        }
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

#[derive(Debug, Clone)]
enum ConnectionEvent {
    Created { uri: String },
    Opened,
    Closed,
    Deleted,
}

type Staged = StagedCommand<ConnectivityCommand, ConnectionEvent, Value>;

/// Which actions a command needs. Illustrative only.
fn stage(command: ConnectivityCommand, reply_to: ReplyTo<Value>) -> Staged {
    let (event, actions) = match &command.kind {
        Kind::Create { uri } => (
            Some(ConnectionEvent::Created { uri: uri.clone() }),
            vec![PersistAndApplyEvent, OpenConnection, UpdateSubscriptions, SendResponse],
        ),
        Kind::Open => (
            Some(ConnectionEvent::Opened),
            vec![PersistAndApplyEvent, OpenConnection, SendResponse],
        ),
        Kind::Close => (
            Some(ConnectionEvent::Closed),
            vec![PersistAndApplyEvent, CloseConnection, StopClientActors, SendResponse],
        ),
        Kind::Test { .. } => (None, vec![TestConnection, SendResponse]),
        Kind::RetrieveStatus => (None, vec![RetrieveConnectionStatus, SendResponse]),
        Kind::EnableLogs => (None, vec![EnableLogging, SendResponse]),
        Kind::RetrieveLogs => (None, vec![RetrieveConnectionLogs, SendResponse]),
        Kind::Delete => (
            Some(ConnectionEvent::Deleted),
            vec![
                PersistAndApplyEvent,
                CloseConnectionIgnoreErrors,
                StopClientActors,
                SendResponse,
                Passivate,
            ],
        ),
    };
    let response = json!({ "status": 202, "command": command.name() });
    StagedCommand::new(command, event, response, actions).with_sender_if_unset(reply_to)
}

// ============================================================================
// Clients (the collaborator awaited by open/close/test)
// ============================================================================

#[async_trait]
trait ClientPool: Send + Sync {
    fn labels(&self) -> Vec<AcknowledgementLabel>;

    /// Ask every client to connect; each acknowledges under its own label.
    async fn open(&self, entity_id: &EntityId, correlation_id: &CorrelationId, acks: AckSender);

    async fn close(&self) -> Result<()>;

    async fn test(&self, uri: &str) -> Result<()>;
}

struct FakeClients {
    count: usize,
    /// Index of a client that never answers.
    silent: Option<usize>,
}

#[async_trait]
impl ClientPool for FakeClients {
    fn labels(&self) -> Vec<AcknowledgementLabel> {
        (0..self.count)
            .filter_map(|i| AcknowledgementLabel::parse(format!("client:{i}")).ok())
            .collect()
    }

    async fn open(&self, entity_id: &EntityId, correlation_id: &CorrelationId, acks: AckSender) {
        for (i, label) in self.labels().into_iter().enumerate() {
            if Some(i) == self.silent {
                continue;
            }
            let ack = Acknowledgement::new(
                label,
                entity_id.clone(),
                AckStatus::OK,
                Headers::for_correlation(correlation_id).with("internal-client-node", "node-1"),
                Some(json!({ "client": i, "state": "connected" })),
            );
            let acks = acks.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20 * (i as u64 + 1))).await;
                let _ = acks.send(ack);
            });
        }
    }

    async fn close(&self) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }

    async fn test(&self, uri: &str) -> Result<()> {
        if uri.starts_with("amqp://") || uri.starts_with("mqtt://") {
            Ok(())
        } else {
            anyhow::bail!("unsupported scheme in <{uri}>")
        }
    }
}

// ============================================================================
// Interpreter (entity-specific meaning of each action)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Status {
    Closed,
    Open,
    Deleted,
}

struct ConnectionInterpreter {
    clients: Arc<dyn ClientPool>,
    acks: AckConfig,
    journal: Vec<ConnectionEvent>,
    status: Status,
    uri: Option<String>,
}

impl ConnectionInterpreter {
    fn apply(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Created { uri } => self.uri = Some(uri.clone()),
            ConnectionEvent::Opened => self.status = Status::Open,
            ConnectionEvent::Closed => self.status = Status::Closed,
            ConnectionEvent::Deleted => self.status = Status::Deleted,
        }
    }

    fn open(
        &self,
        ctx: &WorkflowContext<ConnectivityCommand>,
        action: ConnectionAction,
        staged: Staged,
    ) -> ActionEffect<ConnectivityCommand, ConnectionEvent, Value> {
        let tolerate = action.tolerates_errors();
        let correlation_id = staged
            .command()
            .correlation_id()
            .unwrap_or_else(CorrelationId::new);
        let mut aggregator = self.acks.aggregator(ctx.owner_id().clone(), correlation_id.clone());
        let requests: Vec<_> = self
            .clients
            .labels()
            .into_iter()
            .map(AcknowledgementRequest::new)
            .collect();
        aggregator.add_requests(&requests);

        let clients = Arc::clone(&self.clients);
        let logger = ctx.public_logger().clone();
        ActionEffect::awaiting(async move {
            let (collector, sender) = AckCollector::new(aggregator);
            clients.open(staged.command().entity_id(), &correlation_id, sender).await;
            let result = collector.collect(staged.command().headers()).await;

            match result {
                Ok(acks) if acks.is_successful() => {
                    logger.success(LogCategory::Connection, Some(&correlation_id), "connection opened");
                    staged
                }
                Ok(acks) => {
                    let failed: Vec<_> = acks.failed().map(|a| a.label().to_string()).collect();
                    logger.failure(
                        LogCategory::Connection,
                        Some(&correlation_id),
                        format!("clients did not confirm: {failed:?}"),
                    );
                    if tolerate {
                        staged
                    } else {
                        staged.with_response(json!({
                            "status": acks.status().code(),
                            "error": "connectivity:connection.failed",
                            "failed": failed,
                        }))
                    }
                }
                Err(err) => staged.with_response(json!({ "status": 500, "error": err.to_string() })),
            }
        })
    }
}

impl ActionInterpreter<ConnectivityCommand, ConnectionEvent, Value> for ConnectionInterpreter {
    fn interpret(
        &mut self,
        ctx: &WorkflowContext<ConnectivityCommand>,
        action: ConnectionAction,
        staged: Staged,
    ) -> ActionEffect<ConnectivityCommand, ConnectionEvent, Value> {
        let correlation_id = staged.command().correlation_id();
        match action {
            ApplyEvent | PersistAndApplyEvent => {
                if let Some(event) = staged.event().cloned() {
                    if action == PersistAndApplyEvent {
                        self.journal.push(event.clone());
                    }
                    self.apply(&event);
                }
                ActionEffect::Continue(staged)
            }
            TestConnection => {
                if let Err(err) = ctx.validator().validate(staged.command()) {
                    let _ = staged
                        .with_response(json!({ "status": 400, "error": err.to_string() }))
                        .deliver_response();
                    return ActionEffect::stop(err.to_string());
                }
                let uri = match &staged.command().kind {
                    Kind::Test { uri } => uri.clone(),
                    _ => self.uri.clone().unwrap_or_default(),
                };
                let clients = Arc::clone(&self.clients);
                let timeout = ctx.request_timeout();
                ActionEffect::awaiting(async move {
                    let outcome = match ask_with_timeout(clients.test(&uri), timeout).await {
                        Ok(Ok(())) => json!({ "status": 200, "result": "connection test successful" }),
                        Ok(Err(err)) => json!({ "status": 400, "error": err.to_string() }),
                        Err(err) => json!({ "status": 408, "error": err.to_string() }),
                    };
                    staged.with_response(outcome)
                })
            }
            OpenConnection | OpenConnectionIgnoreErrors => self.open(ctx, action, staged),
            CloseConnection | CloseConnectionIgnoreErrors | StopClientActors => {
                let clients = Arc::clone(&self.clients);
                let timeout = ctx.request_timeout();
                ActionEffect::awaiting(async move {
                    match ask_with_timeout(clients.close(), timeout).await {
                        Ok(Ok(())) => staged,
                        _ if action.tolerates_errors() => staged,
                        Ok(Err(err)) => staged.with_response(json!({ "status": 500, "error": err.to_string() })),
                        Err(err) => staged.with_response(json!({ "status": 408, "error": err.to_string() })),
                    }
                })
            }
            UpdateSubscriptions | BroadcastToClientActorsIfStarted => {
                info!(%action, status = ?self.status, "notifying clients");
                ActionEffect::Continue(staged)
            }
            RetrieveConnectionStatus | RetrieveConnectionMetrics => {
                let status = json!({
                    "status": 200,
                    "connectionStatus": format!("{:?}", self.status).to_lowercase(),
                    "journalLength": self.journal.len(),
                });
                ActionEffect::Continue(staged.with_response(status))
            }
            EnableLogging => {
                ctx.logger_registry()
                    .enable_logging_for_default(ctx.owner_id(), chrono::Utc::now());
                ctx.connection_logger().success(
                    LogCategory::Connection,
                    correlation_id.as_ref(),
                    "connection logging enabled",
                );
                ActionEffect::Continue(staged)
            }
            DisableLogging => {
                ctx.logger_registry().disable_logging(ctx.owner_id());
                ActionEffect::Continue(staged)
            }
            RetrieveConnectionLogs => {
                let mut entries = ctx.public_logger().entries();
                entries.extend(ctx.logger_registry().logs(ctx.owner_id()));
                let logs = serde_json::to_value(entries).unwrap_or(Value::Null);
                ActionEffect::Continue(staged.with_response(json!({ "status": 200, "logs": logs })))
            }
            SendResponse => {
                if let Err(err) = staged.deliver_response() {
                    tracing::warn!(error = %err, "caller went away before the response");
                }
                ActionEffect::Continue(staged)
            }
            Passivate => ActionEffect::Passivate,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

struct UriValidator;

impl CommandValidator<ConnectivityCommand> for UriValidator {
    fn validate(&self, command: &ConnectivityCommand) -> Result<(), ValidationError> {
        match &command.kind {
            Kind::Test { uri } | Kind::Create { uri } if uri.is_empty() => {
                Err(ValidationError::new("connection uri must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let owner = EntityId::parse("connection-4711")?;
    let logging = LoggingConfig::default();
    let ctx = WorkflowContext::new(
        owner.clone(),
        Arc::new(ConnectionLoggerRegistry::new(logging.clone())),
        ConnectionLogger::always_on(owner.clone(), logging.capacity),
        Arc::new(UriValidator),
    );

    let engine_config = EngineConfig {
        request_timeout: Duration::from_secs(2),
        ..EngineConfig::default()
    };
    let interpreter = ConnectionInterpreter {
        clients: Arc::new(FakeClients { count: 3, silent: None }),
        acks: AckConfig {
            timeout: Duration::from_millis(500),
            ..AckConfig::default()
        },
        journal: Vec::new(),
        status: Status::Closed,
        uri: None,
    };

    let handle = WorkflowEngine::builder(ctx, interpreter)
        .with_config(engine_config)
        .build()
        .start();

    let commands = vec![
        Kind::Test { uri: "ftp://broker".to_string() },
        Kind::Create { uri: "amqp://broker:5672".to_string() },
        Kind::EnableLogs,
        Kind::RetrieveStatus,
        Kind::Close,
        Kind::Open,
        Kind::RetrieveLogs,
        Kind::Delete,
    ];

    for kind in commands {
        let command = ConnectivityCommand::new(&owner, kind);
        let name = command.name().to_string();
        let (reply_to, mut replies) = ReplyTo::channel();

        handle.submit(stage(command, reply_to)).await?;
        match replies.recv().await {
            Some(response) => println!("{name}: {response}"),
            None => println!("{name}: no response"),
        }
    }

    handle.stopped().await;
    println!("Connection passivated.");

    Ok(())
}
