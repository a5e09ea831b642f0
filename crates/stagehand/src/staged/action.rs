use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One step of a connection workflow.
///
/// A plain tag: whatever data the step needs lives on the
/// [`StagedCommand`](crate::StagedCommand) carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionAction {
    /// Verify the connection configuration against the remote system.
    TestConnection,
    /// Apply the staged event to in-memory state without persisting it.
    ApplyEvent,
    /// Persist the staged event, then apply it.
    PersistAndApplyEvent,
    OpenConnection,
    /// Open, but continue the workflow even if opening fails.
    OpenConnectionIgnoreErrors,
    CloseConnection,
    /// Close, but continue the workflow even if closing fails.
    CloseConnectionIgnoreErrors,
    StopClientActors,
    SendResponse,
    /// Stop the owning entity once this workflow is done with it.
    Passivate,
    UpdateSubscriptions,
    /// Forward the command to running clients without waiting for them.
    BroadcastToClientActorsIfStarted,
    RetrieveConnectionLogs,
    RetrieveConnectionStatus,
    RetrieveConnectionMetrics,
    EnableLogging,
    DisableLogging,
}

impl ConnectionAction {
    pub const ALL: [ConnectionAction; 17] = [
        ConnectionAction::TestConnection,
        ConnectionAction::ApplyEvent,
        ConnectionAction::PersistAndApplyEvent,
        ConnectionAction::OpenConnection,
        ConnectionAction::OpenConnectionIgnoreErrors,
        ConnectionAction::CloseConnection,
        ConnectionAction::CloseConnectionIgnoreErrors,
        ConnectionAction::StopClientActors,
        ConnectionAction::SendResponse,
        ConnectionAction::Passivate,
        ConnectionAction::UpdateSubscriptions,
        ConnectionAction::BroadcastToClientActorsIfStarted,
        ConnectionAction::RetrieveConnectionLogs,
        ConnectionAction::RetrieveConnectionStatus,
        ConnectionAction::RetrieveConnectionMetrics,
        ConnectionAction::EnableLogging,
        ConnectionAction::DisableLogging,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionAction::TestConnection => "TEST_CONNECTION",
            ConnectionAction::ApplyEvent => "APPLY_EVENT",
            ConnectionAction::PersistAndApplyEvent => "PERSIST_AND_APPLY_EVENT",
            ConnectionAction::OpenConnection => "OPEN_CONNECTION",
            ConnectionAction::OpenConnectionIgnoreErrors => "OPEN_CONNECTION_IGNORE_ERRORS",
            ConnectionAction::CloseConnection => "CLOSE_CONNECTION",
            ConnectionAction::CloseConnectionIgnoreErrors => "CLOSE_CONNECTION_IGNORE_ERRORS",
            ConnectionAction::StopClientActors => "STOP_CLIENT_ACTORS",
            ConnectionAction::SendResponse => "SEND_RESPONSE",
            ConnectionAction::Passivate => "PASSIVATE",
            ConnectionAction::UpdateSubscriptions => "UPDATE_SUBSCRIPTIONS",
            ConnectionAction::BroadcastToClientActorsIfStarted => {
                "BROADCAST_TO_CLIENT_ACTORS_IF_STARTED"
            }
            ConnectionAction::RetrieveConnectionLogs => "RETRIEVE_CONNECTION_LOGS",
            ConnectionAction::RetrieveConnectionStatus => "RETRIEVE_CONNECTION_STATUS",
            ConnectionAction::RetrieveConnectionMetrics => "RETRIEVE_CONNECTION_METRICS",
            ConnectionAction::EnableLogging => "ENABLE_LOGGING",
            ConnectionAction::DisableLogging => "DISABLE_LOGGING",
        }
    }

    /// Whether the step needs a reply from another component before the
    /// workflow may move on.
    pub fn awaits_collaborator(self) -> bool {
        matches!(
            self,
            ConnectionAction::TestConnection
                | ConnectionAction::OpenConnection
                | ConnectionAction::OpenConnectionIgnoreErrors
                | ConnectionAction::CloseConnection
                | ConnectionAction::CloseConnectionIgnoreErrors
                | ConnectionAction::StopClientActors
                | ConnectionAction::RetrieveConnectionLogs
                | ConnectionAction::RetrieveConnectionStatus
                | ConnectionAction::RetrieveConnectionMetrics
        )
    }

    pub fn tolerates_errors(self) -> bool {
        matches!(
            self,
            ConnectionAction::OpenConnectionIgnoreErrors
                | ConnectionAction::CloseConnectionIgnoreErrors
        )
    }
}

impl fmt::Display for ConnectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ConnectionAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::invalid("connection_action", format!("unknown action <{s}>")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_serde() {
        for action in ConnectionAction::ALL {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, serde_json::Value::String(action.as_str().to_string()));
            assert_eq!(action.as_str().parse::<ConnectionAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        assert!("REBOOT".parse::<ConnectionAction>().is_err());
    }

    #[test]
    fn test_classification() {
        assert!(ConnectionAction::OpenConnection.awaits_collaborator());
        assert!(!ConnectionAction::BroadcastToClientActorsIfStarted.awaits_collaborator());
        assert!(!ConnectionAction::PersistAndApplyEvent.awaits_collaborator());
        assert!(ConnectionAction::CloseConnectionIgnoreErrors.tolerates_errors());
        assert!(!ConnectionAction::CloseConnection.tolerates_errors());
    }
}
