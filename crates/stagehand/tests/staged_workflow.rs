use std::time::Duration;

use stagehand_core::{
    ConnectionAction::{self, *},
    Command, Error, Headers, ReplyTo, WorkflowEngine,
};
use stagehand_testing::{context, staged, ScriptedInterpreter, Step};

#[test]
fn test_fifo_with_independent_values() {
    let a = staged("modify", [CloseConnection, PersistAndApplyEvent, OpenConnection]);
    assert_eq!(a.current_action().unwrap(), CloseConnection);

    let b = a.advance().unwrap();
    assert_eq!(b.current_action().unwrap(), PersistAndApplyEvent);
    assert_eq!(a.current_action().unwrap(), CloseConnection);

    let done = b.advance().unwrap().advance().unwrap();
    assert!(!done.has_more());
    assert!(matches!(done.advance(), Err(Error::EmptyActionQueue)));
    assert!(matches!(done.current_action(), Err(Error::EmptyActionQueue)));
}

#[test]
fn test_first_sender_wins() {
    let (x, _x_rx) = ReplyTo::channel();
    let (y, _y_rx) = ReplyTo::channel();

    let with_x = staged("open", [OpenConnection]).with_sender_if_unset(x.clone());
    let still_x = with_x.with_sender_if_unset(y.clone());

    assert_eq!(still_x.sender(), Some(&x));
    assert_ne!(still_x.sender(), Some(&y));
}

#[test]
fn test_header_update_survives_advance() {
    let original = staged("modify", [ApplyEvent, SendResponse]);
    let updated = original.with_headers(Headers::new().with("correlation-id", "c9"));
    let next = updated.advance().unwrap();

    assert_eq!(next.command().headers().correlation_id(), Some("c9"));
    assert_eq!(next.command().name(), "modify");
    assert!(original.command().headers().is_empty());
    assert_eq!(next.response(), original.response());
}

#[tokio::test]
async fn test_engine_runs_each_action_once_in_order() {
    let interpreter = ScriptedInterpreter::new();
    let log = interpreter.log();
    let handle = WorkflowEngine::builder(context(), interpreter).build().start();

    let actions = [
        TestConnection,
        PersistAndApplyEvent,
        UpdateSubscriptions,
        SendResponse,
    ];
    handle.submit(staged("create", actions)).await.unwrap();
    handle.settled().await;

    assert_eq!(log.for_command("create"), actions.to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_follow_up_waits_for_reply_while_others_progress() {
    let interpreter = ScriptedInterpreter::new().on(
        OpenConnection,
        Step::Reply {
            after: Duration::from_secs(1),
            response: Some("connection opened".to_string()),
        },
    );
    let log = interpreter.log();
    let handle = WorkflowEngine::builder(context(), interpreter).build().start();
    let (reply_to, mut replies) = ReplyTo::channel();

    handle
        .submit(staged("open", [OpenConnection, SendResponse]).with_sender_if_unset(reply_to))
        .await
        .unwrap();
    handle
        .submit(staged("status", [RetrieveConnectionStatus, SendResponse]))
        .await
        .unwrap();
    handle.settled().await;

    let entries = log.entries();
    let position = |name: &str, action: ConnectionAction| {
        entries
            .iter()
            .position(|(n, a)| n == name && *a == action)
            .unwrap()
    };
    assert!(position("status", SendResponse) < position("open", SendResponse));
    assert_eq!(log.for_command("open"), vec![OpenConnection, SendResponse]);
    assert_eq!(replies.recv().await.unwrap(), "connection opened");
}

#[tokio::test]
async fn test_stop_skips_rest_of_workflow() {
    let interpreter =
        ScriptedInterpreter::new().on(TestConnection, Step::Stop("unreachable host".to_string()));
    let log = interpreter.log();
    let handle = WorkflowEngine::builder(context(), interpreter).build().start();
    let (reply_to, mut replies) = ReplyTo::channel();

    handle
        .submit(staged("test", [TestConnection, SendResponse]).with_sender_if_unset(reply_to))
        .await
        .unwrap();
    handle.settled().await;

    assert_eq!(log.for_command("test"), vec![TestConnection]);
    assert!(replies.try_recv().is_err());
}

#[tokio::test]
async fn test_passivation_closes_mailbox() {
    let interpreter = ScriptedInterpreter::new().on(Passivate, Step::Passivate);
    let handle = WorkflowEngine::builder(context(), interpreter)
        .with_mailbox_capacity(1)
        .build()
        .start();

    handle
        .submit(staged("delete", [CloseConnectionIgnoreErrors, SendResponse, Passivate]))
        .await
        .unwrap();
    handle.stopped().await;

    assert!(matches!(
        handle.submit(staged("late", [SendResponse])).await,
        Err(Error::MailboxClosed)
    ));
}
