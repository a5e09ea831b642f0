use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stagehand_core::{
    AckCollector, AckStatus, AcknowledgementAggregator, CorrelationId, Headers,
    InternalHeaderFilter, PassThrough,
};
use stagehand_testing::{
    ack, ack_with, assert_all_timed_out, assert_genuine, label, labels, RecordingHeaderFilter,
    TEST_ENTITY,
};

const LABELS: [&str; 6] = ["ack-a", "ack-b", "ack-c", "ack-d", "ack-e", "ack-f"];

fn aggregator(requested: &[&str]) -> AcknowledgementAggregator {
    let mut aggregator =
        AcknowledgementAggregator::new(TEST_ENTITY, "c1", Duration::from_secs(2), Arc::new(PassThrough))
            .unwrap();
    aggregator.add_requests(&labels(requested));
    aggregator
}

fn headers() -> Headers {
    Headers::for_correlation(&CorrelationId::parse("c1").unwrap())
}

#[test]
fn test_any_arrival_order_yields_only_genuine_acknowledgements() {
    let mut rng = fastrand::Rng::with_seed(7);

    for _ in 0..50 {
        let count = rng.usize(1..=LABELS.len());
        let requested = &LABELS[..count];
        let mut aggregator = aggregator(requested);

        let mut arrivals = requested.to_vec();
        rng.shuffle(&mut arrivals);
        for l in &arrivals {
            assert!(!aggregator.all_received());
            assert!(aggregator.add_received(ack(l, AckStatus::OK)));
        }

        assert!(aggregator.all_received());
        assert!(aggregator.is_successful());

        let result = aggregator.build_result(&headers()).unwrap();
        assert_eq!(result.len(), count);
        assert_genuine(&result);
        let order: Vec<_> = result.labels().map(|l| l.as_str()).collect();
        assert_eq!(order, requested);
    }
}

#[test]
fn test_duplicate_leaves_state_unchanged() {
    let mut aggregator = aggregator(&["ack-a", "ack-b"]);
    aggregator.add_received(ack_with("ack-a", AckStatus::OK, Some(json!({"n": 1})), Headers::new()));

    let before = aggregator.build_result(&headers()).unwrap();
    let pending_before = aggregator.pending_count();

    let accepted = aggregator.add_received(ack_with(
        "ack-a",
        AckStatus::CREATED,
        Some(json!({"n": 2})),
        Headers::new(),
    ));

    assert!(!accepted);
    assert_eq!(aggregator.build_result(&headers()).unwrap(), before);
    assert_eq!(aggregator.pending_count(), pending_before);
    assert_eq!(
        before.get(&label("ack-a")).unwrap().payload(),
        Some(&json!({"n": 1}))
    );
}

#[test]
fn test_unsolicited_never_changes_observable_state() {
    let mut rng = fastrand::Rng::with_seed(11);

    for _ in 0..20 {
        let mut aggregator = aggregator(&["ack-a", "ack-b"]);
        if rng.bool() {
            aggregator.add_received(ack("ack-a", AckStatus::OK));
        }

        let all_before = aggregator.all_received();
        let success_before = aggregator.is_successful();
        let keys_before: Vec<_> = aggregator
            .build_result(&headers())
            .unwrap()
            .labels()
            .cloned()
            .collect();

        aggregator.add_received(ack("not-requested", AckStatus::OK));

        assert_eq!(aggregator.all_received(), all_before);
        assert_eq!(aggregator.is_successful(), success_before);
        let keys_after: Vec<_> = aggregator
            .build_result(&headers())
            .unwrap()
            .labels()
            .cloned()
            .collect();
        assert_eq!(keys_after, keys_before);
    }
}

#[test]
fn test_no_arrivals_reports_every_label_as_timeout() {
    let aggregator = aggregator(&LABELS);

    let result = aggregator.build_result(&headers()).unwrap();

    assert_eq!(result.len(), LABELS.len());
    assert_all_timed_out(&result);
    assert!(!aggregator.is_successful());
    assert_eq!(result.status(), AckStatus::FAILED_DEPENDENCY);
}

#[test]
fn test_success_requires_all_and_every_success() {
    let mut rng = fastrand::Rng::with_seed(3);

    for _ in 0..50 {
        let mut aggregator = aggregator(&LABELS);
        let mut all_ok = true;
        let mut all_arrived = true;

        for l in LABELS {
            match rng.u8(0..3) {
                0 => all_arrived = false,
                1 => {
                    aggregator.add_received(ack(l, AckStatus::OK));
                }
                _ => {
                    all_ok = false;
                    aggregator.add_received(ack(l, AckStatus::INTERNAL_SERVER_ERROR));
                }
            }
        }

        assert_eq!(aggregator.all_received(), all_arrived);
        assert_eq!(aggregator.is_successful(), all_arrived && all_ok);
    }
}

#[test]
fn test_filter_only_sees_accepted_acknowledgements() {
    let filter = Arc::new(RecordingHeaderFilter::new(InternalHeaderFilter::new()));
    let mut aggregator =
        AcknowledgementAggregator::new(TEST_ENTITY, "c1", Duration::from_secs(2), filter.clone())
            .unwrap();
    aggregator.add_requests(&labels(&["ack-a"]));

    aggregator.add_received(ack_with(
        "ack-a",
        AckStatus::OK,
        None,
        Headers::new().with("internal-hop", "1").with("version", "3"),
    ));
    aggregator.add_received(ack("ack-a", AckStatus::OK));
    aggregator.add_received(ack("ack-z", AckStatus::OK));

    assert_eq!(filter.calls(), 1);
    let result = aggregator.build_result(&headers()).unwrap();
    assert_eq!(
        result.get(&label("ack-a")).unwrap().headers(),
        &Headers::new().with("version", "3")
    );
}

#[tokio::test(start_paused = true)]
async fn test_partial_arrival_reported_at_deadline() {
    let (collector, sender) = AckCollector::new(aggregator(&["ack-l1", "ack-l2"]));

    sender.send(ack("ack-l1", AckStatus::OK)).unwrap();
    let result = collector.collect(&headers()).await.unwrap();

    assert!(result.get(&label("ack-l1")).unwrap().is_success());
    assert!(result.get(&label("ack-l2")).unwrap().is_timeout());
    assert!(!result.is_successful());
    assert_eq!(result.headers().correlation_id(), Some("c1"));
}

#[tokio::test]
async fn test_concurrent_senders_are_funneled() {
    let (collector, sender) = AckCollector::new(aggregator(&LABELS));

    for l in LABELS {
        let sender = sender.clone();
        tokio::spawn(async move {
            sender.send(ack(l, AckStatus::OK)).unwrap();
        });
    }
    drop(sender);

    let result = collector.collect(&headers()).await.unwrap();
    assert!(result.is_successful());
    assert_genuine(&result);
}
