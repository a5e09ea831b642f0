//! Read-only collaborators handed to action interpreters.
//!
//! A [`WorkflowContext`] is built once per owning entity and passed by
//! reference into every interpretation of a [`ConnectionAction`]. Staged
//! commands never hold one, which keeps them plain data.
//!
//! [`ConnectionAction`]: crate::ConnectionAction

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LoggingConfig;
use crate::core::{CorrelationId, EntityId};
use crate::error::ValidationError;
use crate::request::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Connection,
    Source,
    Target,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: LogCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
enum Activity {
    Always,
    Until(DateTime<Utc>),
    Off,
}

#[derive(Debug)]
struct LoggerState {
    entries: VecDeque<LogEntry>,
    activity: Activity,
}

/// Bounded, in-memory log of what happened to one entity.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct ConnectionLogger {
    entity_id: EntityId,
    capacity: usize,
    state: Arc<Mutex<LoggerState>>,
}

impl ConnectionLogger {
    /// A logger that records until explicitly disabled.
    pub fn always_on(entity_id: EntityId, capacity: usize) -> Self {
        Self::with_activity(entity_id, capacity, Activity::Always)
    }

    /// A logger that drops writes until enabled.
    pub fn disabled(entity_id: EntityId, capacity: usize) -> Self {
        Self::with_activity(entity_id, capacity, Activity::Off)
    }

    fn with_activity(entity_id: EntityId, capacity: usize, activity: Activity) -> Self {
        Self {
            entity_id,
            capacity,
            state: Arc::new(Mutex::new(LoggerState {
                entries: VecDeque::with_capacity(capacity),
                activity,
            })),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn success(
        &self,
        category: LogCategory,
        correlation_id: Option<&CorrelationId>,
        message: impl Into<String>,
    ) {
        self.record(LogLevel::Success, category, correlation_id, message.into());
    }

    pub fn failure(
        &self,
        category: LogCategory,
        correlation_id: Option<&CorrelationId>,
        message: impl Into<String>,
    ) {
        self.record(LogLevel::Failure, category, correlation_id, message.into());
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.lock().activity {
            Activity::Always => true,
            Activity::Until(until) => now < until,
            Activity::Off => false,
        }
    }

    fn enable_until(&self, until: DateTime<Utc>) {
        self.lock().activity = Activity::Until(until);
    }

    fn disable(&self) {
        self.lock().activity = Activity::Off;
    }

    fn record(
        &self,
        level: LogLevel,
        category: LogCategory,
        correlation_id: Option<&CorrelationId>,
        message: String,
    ) {
        let now = Utc::now();
        if !self.is_active_at(now) || self.capacity == 0 {
            return;
        }

        match level {
            LogLevel::Success => info!(entity_id = %self.entity_id, ?category, "{message}"),
            LogLevel::Failure => warn!(entity_id = %self.entity_id, ?category, "{message}"),
        }

        let mut state = self.lock();
        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(LogEntry {
            timestamp: now,
            level,
            category,
            correlation_id: correlation_id.cloned(),
            message,
        });
    }

    fn lock(&self) -> MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ConnectionLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLogger")
            .field("entity_id", &self.entity_id)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Per-entity connection loggers, shared across all entities of a node.
#[derive(Debug, Default)]
pub struct ConnectionLoggerRegistry {
    config: LoggingConfig,
    loggers: DashMap<EntityId, ConnectionLogger>,
}

impl ConnectionLoggerRegistry {
    pub fn new(config: LoggingConfig) -> Self {
        Self {
            config,
            loggers: DashMap::new(),
        }
    }

    /// The logger for `entity_id`, created disabled on first use.
    pub fn logger_for(&self, entity_id: &EntityId) -> ConnectionLogger {
        self.loggers
            .entry(entity_id.clone())
            .or_insert_with(|| ConnectionLogger::disabled(entity_id.clone(), self.config.capacity))
            .clone()
    }

    pub fn enable_logging(&self, entity_id: &EntityId, until: DateTime<Utc>) {
        self.logger_for(entity_id).enable_until(until);
    }

    /// Enable logging for the configured default duration starting at `now`.
    pub fn enable_logging_for_default(&self, entity_id: &EntityId, now: DateTime<Utc>) {
        let until = chrono::Duration::from_std(self.config.default_duration)
            .ok()
            .and_then(|duration| now.checked_add_signed(duration))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.enable_logging(entity_id, until);
    }

    /// Stop recording; entries already recorded stay retrievable.
    pub fn disable_logging(&self, entity_id: &EntityId) {
        if let Some(logger) = self.loggers.get(entity_id) {
            logger.disable();
        }
    }

    pub fn is_logging_active(&self, entity_id: &EntityId, now: DateTime<Utc>) -> bool {
        self.loggers
            .get(entity_id)
            .is_some_and(|logger| logger.is_active_at(now))
    }

    pub fn logs(&self, entity_id: &EntityId) -> Vec<LogEntry> {
        self.loggers
            .get(entity_id)
            .map(|logger| logger.entries())
            .unwrap_or_default()
    }

    pub fn remove(&self, entity_id: &EntityId) {
        self.loggers.remove(entity_id);
    }
}

/// Checks a command before its workflow is staged.
pub trait CommandValidator<C>: Send + Sync {
    fn validate(&self, command: &C) -> Result<(), ValidationError>;
}

impl<C, F> CommandValidator<C> for F
where
    F: Fn(&C) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, command: &C) -> Result<(), ValidationError> {
        self(command)
    }
}

/// Validator that accepts every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<C> CommandValidator<C> for AcceptAll {
    fn validate(&self, _command: &C) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Collaborators an action interpreter needs, independent of any one
/// staged command.
pub struct WorkflowContext<C> {
    owner_id: EntityId,
    logger_registry: Arc<ConnectionLoggerRegistry>,
    public_logger: ConnectionLogger,
    validator: Arc<dyn CommandValidator<C>>,
    request_timeout: Duration,
}

impl<C> WorkflowContext<C> {
    pub fn new(
        owner_id: EntityId,
        logger_registry: Arc<ConnectionLoggerRegistry>,
        public_logger: ConnectionLogger,
        validator: Arc<dyn CommandValidator<C>>,
    ) -> Self {
        Self {
            owner_id,
            logger_registry,
            public_logger,
            validator,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override how long interpreters wait on a collaborator. The engine
    /// sets this from [`EngineConfig::request_timeout`] when it starts.
    ///
    /// [`EngineConfig::request_timeout`]: crate::EngineConfig
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn owner_id(&self) -> &EntityId {
        &self.owner_id
    }

    pub fn logger_registry(&self) -> &ConnectionLoggerRegistry {
        &self.logger_registry
    }

    pub fn public_logger(&self) -> &ConnectionLogger {
        &self.public_logger
    }

    pub fn validator(&self) -> &dyn CommandValidator<C> {
        self.validator.as_ref()
    }

    /// Timeout for [`ask_with_timeout`](crate::ask_with_timeout) calls made
    /// while interpreting an action.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// The owner's own connection logger from the registry.
    pub fn connection_logger(&self) -> ConnectionLogger {
        self.logger_registry.logger_for(&self.owner_id)
    }
}

impl<C> Clone for WorkflowContext<C> {
    fn clone(&self) -> Self {
        Self {
            owner_id: self.owner_id.clone(),
            logger_registry: Arc::clone(&self.logger_registry),
            public_logger: self.public_logger.clone(),
            validator: Arc::clone(&self.validator),
            request_timeout: self.request_timeout,
        }
    }
}

impl<C> fmt::Debug for WorkflowContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}
