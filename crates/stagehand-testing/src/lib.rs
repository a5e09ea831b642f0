//! Testing utilities for stagehand.
//!
//! Fixtures for acknowledgements and a scripted [`ActionInterpreter`] that
//! records which actions ran, in which order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagehand_core::{
    AckStatus, AcceptAll, Acknowledgement, AcknowledgementLabel, AcknowledgementRequest,
    Acknowledgements, ActionEffect, ActionInterpreter, Command, ConnectionAction, ConnectionLogger,
    ConnectionLoggerRegistry, EntityId, HeaderFilter, Headers, StagedCommand, WorkflowContext,
};

/// Entity id used by every fixture.
pub const TEST_ENTITY: &str = "test-connection";

pub fn entity() -> EntityId {
    EntityId::parse(TEST_ENTITY).expect("valid test entity id")
}

pub fn label(label: &str) -> AcknowledgementLabel {
    AcknowledgementLabel::parse(label).expect("valid test label")
}

/// Requests for each of the given labels.
pub fn labels(labels: &[&str]) -> Vec<AcknowledgementRequest> {
    labels
        .iter()
        .map(|l| AcknowledgementRequest::new(label(l)))
        .collect()
}

/// A genuine acknowledgement for [`TEST_ENTITY`] without payload or headers.
pub fn ack(label_str: &str, status: AckStatus) -> Acknowledgement {
    ack_with(label_str, status, None, Headers::new())
}

pub fn ack_with(
    label_str: &str,
    status: AckStatus,
    payload: Option<Value>,
    headers: Headers,
) -> Acknowledgement {
    Acknowledgement::new(label(label_str), entity(), status, headers, payload)
}

/// Minimal command for staged workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCommand {
    name: String,
    entity_id: EntityId,
    headers: Headers,
}

impl TestCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_id: entity(),
            headers: Headers::new(),
        }
    }
}

impl Command for TestCommand {
    fn name(&self) -> &str {
        &self.name
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

/// Staged command shape used with [`ScriptedInterpreter`].
pub type TestStaged = StagedCommand<TestCommand, Value, String>;

pub fn staged(name: &str, actions: impl IntoIterator<Item = ConnectionAction>) -> TestStaged {
    StagedCommand::new(
        TestCommand::new(name),
        None,
        format!("{name}:accepted"),
        actions.into_iter().collect::<stagehand_core::ActionQueue>(),
    )
}

/// Workflow context owned by [`TEST_ENTITY`] that accepts every command.
pub fn context<C: 'static>() -> WorkflowContext<C> {
    WorkflowContext::new(
        entity(),
        Arc::new(ConnectionLoggerRegistry::default()),
        ConnectionLogger::always_on(entity(), 100),
        Arc::new(AcceptAll),
    )
}

/// Header filter delegating to another filter and counting calls.
pub struct RecordingHeaderFilter<F> {
    inner: F,
    calls: AtomicUsize,
}

impl<F: HeaderFilter> RecordingHeaderFilter<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F: HeaderFilter> HeaderFilter for RecordingHeaderFilter<F> {
    fn filter(&self, headers: &Headers) -> Headers {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.filter(headers)
    }
}

/// What a [`ScriptedInterpreter`] does for one action.
#[derive(Debug, Clone)]
pub enum Step {
    Continue,
    /// Await a reply arriving after `after`, optionally replacing the response.
    Reply {
        after: Duration,
        response: Option<String>,
    },
    Stop(String),
    Passivate,
}

/// Shared record of `(command name, action)` pairs in execution order.
#[derive(Debug, Clone, Default)]
pub struct ActionLog(Arc<Mutex<Vec<(String, ConnectionAction)>>>);

impl ActionLog {
    pub fn entries(&self) -> Vec<(String, ConnectionAction)> {
        self.0.lock().expect("action log poisoned").clone()
    }

    /// Actions executed for one command.
    pub fn for_command(&self, name: &str) -> Vec<ConnectionAction> {
        self.entries()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, action)| action)
            .collect()
    }

    fn push(&self, name: &str, action: ConnectionAction) {
        self.0
            .lock()
            .expect("action log poisoned")
            .push((name.to_string(), action));
    }
}

/// Interpreter driven by a per-action script. Unscripted actions continue
/// immediately; `SendResponse` also delivers the current response.
pub struct ScriptedInterpreter {
    script: HashMap<ConnectionAction, Step>,
    log: ActionLog,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            log: ActionLog::default(),
        }
    }

    pub fn on(mut self, action: ConnectionAction, step: Step) -> Self {
        self.script.insert(action, step);
        self
    }

    pub fn log(&self) -> ActionLog {
        self.log.clone()
    }
}

impl Default for ScriptedInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionInterpreter<TestCommand, Value, String> for ScriptedInterpreter {
    fn interpret(
        &mut self,
        _ctx: &WorkflowContext<TestCommand>,
        action: ConnectionAction,
        staged: TestStaged,
    ) -> ActionEffect<TestCommand, Value, String> {
        self.log.push(staged.command().name(), action);

        match self.script.get(&action).cloned().unwrap_or(Step::Continue) {
            Step::Continue => {
                if action == ConnectionAction::SendResponse {
                    let _ = staged.deliver_response();
                }
                ActionEffect::Continue(staged)
            }
            Step::Reply { after, response } => ActionEffect::awaiting(async move {
                tokio::time::sleep(after).await;
                match response {
                    Some(response) => staged.with_response(response),
                    None => staged,
                }
            }),
            Step::Stop(reason) => ActionEffect::stop(reason),
            Step::Passivate => ActionEffect::Passivate,
        }
    }
}

/// Assert every entry of `result` is a synthetic timeout.
pub fn assert_all_timed_out(result: &Acknowledgements) {
    for ack in result {
        assert!(
            ack.is_timeout(),
            "expected <{}> to be a timeout placeholder, got status {}",
            ack.label(),
            ack.status()
        );
    }
}

/// Assert no entry of `result` is a synthetic timeout.
pub fn assert_genuine(result: &Acknowledgements) {
    for ack in result {
        assert!(
            !ack.is_timeout(),
            "expected <{}> to be genuine, found a timeout placeholder",
            ack.label()
        );
    }
}
