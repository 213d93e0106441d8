//! End-to-end runs of the orchestrator against the in-memory backends

use bench_config::{BackendKind, BenchConfig, DeliveryMode};
use bench_service::{BenchError, Orchestrator, Phase};
use message_sink::test_utils::{FailPoint, FailingTransport};
use message_sink::{MemoryKeyValue, MemoryTopic, Transport};
use std::sync::Arc;

fn stream_config(duration_ms: u64, warmup_ms: u64) -> BenchConfig {
    let mut config = BenchConfig::default();
    config.test_id = "integration".to_string();
    config.participants.total_senders = 2;
    config.participants.total_receivers = 2;
    config.timing.test_duration_ms = duration_ms;
    config.timing.warmup_duration_ms = warmup_ms;
    config.timing.send_interval_ms = 1_000;
    config.timing.receive_interval_ms = 50;
    config.messages.per_receive = 10;
    config
}

#[tokio::test(start_paused = true)]
async fn test_stream_run_counts_cross_traffic() {
    let config = stream_config(500, 0);
    let transport: Arc<dyn Transport> = Arc::new(MemoryTopic::new());

    let orchestrator = Orchestrator::new(config, transport);
    let phases = orchestrator.phases();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.senders, 2);
    assert_eq!(report.receivers, 2);
    assert_eq!(report.senders_failed, 0);
    assert_eq!(report.receivers_failed, 0);
    assert!(report.tracking_started);
    assert_eq!(*phases.borrow(), Phase::Done);

    let stats = &report.stats.participants;
    for i in 0..2 {
        let other = 1 - i;
        assert_eq!(stats[i].sent, 1, "participant {}", i);
        assert_eq!(stats[i].rcvd, 1, "participant {}", i);
        assert_eq!(stats[i].rcvd_by_id[i], 0, "self traffic counted for {}", i);
        assert_eq!(stats[i].rcvd_by_id[other], 1);
        assert_eq!(stats[i].errors, 0);
    }
    assert_eq!(report.stats.total_sent(), report.stats.total_received());
}

#[tokio::test(start_paused = true)]
async fn test_warmup_traffic_is_flagged_and_not_counted() {
    let mut config = stream_config(3_000, 2_000);
    config.timing.receive_interval_ms = 100;
    let destination = config.backend.destination.clone();

    let topic = Arc::new(MemoryTopic::new());
    topic.connect().await.unwrap();
    let observer = topic.open_subscriber(&destination, "observer").await.unwrap();

    let transport: Arc<dyn Transport> = topic.clone();
    let report = Orchestrator::new(config, transport).run().await.unwrap();
    assert!(report.tracking_started);
    assert_eq!(report.senders_failed + report.receivers_failed, 0);

    // The run closes the transport on exit
    topic.connect().await.unwrap();
    let seen = observer.fetch_batch(usize::MAX).await.unwrap();

    let tracked = seen
        .iter()
        .filter(|e| e.str_attribute("track") == Some("true"))
        .count() as u64;
    let untracked = seen.len() as u64 - tracked;

    assert_eq!(seen.len(), 10, "two senders publish at 0s through 4s");
    assert!(tracked > 0);
    assert!(untracked > 0);
    assert_eq!(report.stats.total_sent(), tracked);
    assert_eq!(report.stats.total_received(), tracked);
}

#[tokio::test(start_paused = true)]
async fn test_warmup_only_run_records_nothing() {
    let config = stream_config(0, 1_000);
    let transport: Arc<dyn Transport> = Arc::new(MemoryTopic::new());

    let report = Orchestrator::new(config, transport).run().await.unwrap();

    assert!(!report.tracking_started);
    assert_eq!(report.stats.total_sent(), 0);
    assert_eq!(report.stats.total_received(), 0);
    assert!(report.elapsed_ms >= 1_000, "ended after {}ms", report.elapsed_ms);
}

#[tokio::test(start_paused = true)]
async fn test_zero_length_run_sends_nothing() {
    let config = stream_config(0, 0);
    let topic = Arc::new(MemoryTopic::new());
    let transport: Arc<dyn Transport> = topic.clone();

    let report = Orchestrator::new(config, transport).run().await.unwrap();

    assert_eq!(report.stats.total_sent(), 0);
    assert_eq!(report.senders_failed + report.receivers_failed, 0);
    assert!(!topic.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_lookup_run_confirms_every_key() {
    let mut config = stream_config(500, 0);
    config.mode = DeliveryMode::Lookup;
    config.backend.kind = BackendKind::MemoryKv;
    config.lookup.max_retries = 5;
    let transport: Arc<dyn Transport> = Arc::new(MemoryKeyValue::new());

    let report = Orchestrator::new(config, transport).run().await.unwrap();

    assert_eq!(report.senders_failed + report.receivers_failed, 0);
    // Both senders may draw the same key, so a receiver can confirm the
    // other sender's newer value
    let stats = &report.stats.participants;
    for i in 0..2 {
        assert_eq!(stats[i].sent, 1);
        assert_eq!(stats[i].rcvd, 1);
        assert_eq!(stats[i].rcvd_by_id.iter().sum::<u64>(), 1);
        assert_eq!(stats[i].retries, 1);
        assert_eq!(stats[i].errors, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_lookup_key_collision_accepts_newer_value() {
    let mut config = stream_config(500, 0);
    config.mode = DeliveryMode::Lookup;
    config.backend.kind = BackendKind::MemoryKv;
    config.lookup.max_retries = 5;
    config.messages.key_count = Some(1);
    let transport: Arc<dyn Transport> = Arc::new(MemoryKeyValue::new());

    let report = Orchestrator::new(config, transport).run().await.unwrap();

    assert_eq!(report.senders_failed + report.receivers_failed, 0);
    let stats = &report.stats.participants;
    for i in 0..2 {
        assert_eq!(stats[i].rcvd, 1, "receiver {} matrix {:?}", i, stats[i].rcvd_by_id);
        assert_eq!(stats[i].errors, 0, "newer value rejected as stale");
    }

    // The last writer's own receiver looks up after that write, so at least
    // one receiver confirms its own sender
    assert!((0..2).any(|i| stats[i].rcvd_by_id[i] == 1));
    let credited: u64 = stats.iter().map(|p| p.rcvd_by_id.iter().sum::<u64>()).sum();
    assert_eq!(credited, report.stats.total_sent());
}

#[tokio::test(start_paused = true)]
async fn test_lookup_waits_out_visibility_delay() {
    let mut config = stream_config(2_000, 0);
    config.mode = DeliveryMode::Lookup;
    config.backend.kind = BackendKind::MemoryKv;
    config.participants.total_senders = 1;
    config.participants.total_receivers = 1;
    config.timing.send_interval_ms = 5_000;
    config.timing.receive_interval_ms = 100;
    config.lookup.max_retries = 10;
    let transport: Arc<dyn Transport> = Arc::new(MemoryKeyValue::with_visibility_delay(
        std::time::Duration::from_millis(250),
    ));

    let report = Orchestrator::new(config, transport).run().await.unwrap();

    let receiver = &report.stats.participants[0];
    assert_eq!(receiver.rcvd, 1);
    assert!(receiver.retries > 1, "found on attempt {}", receiver.retries);
    assert_eq!(receiver.errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_aborts_run() {
    let transport: Arc<dyn Transport> = Arc::new(FailingTransport::new(FailPoint::Connect));

    let err = Orchestrator::new(stream_config(500, 0), transport)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::Connection { .. }), "{}", err);
}

#[tokio::test(start_paused = true)]
async fn test_receiver_handshake_failure_aborts_run() {
    let transport: Arc<dyn Transport> = Arc::new(FailingTransport::new(FailPoint::OpenSubscriber));

    let orchestrator = Orchestrator::new(stream_config(500, 0), transport);
    let phases = orchestrator.phases();
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, BenchError::Connection { .. }), "{}", err);
    assert_eq!(*phases.borrow(), Phase::Done);
}

#[tokio::test(start_paused = true)]
async fn test_sender_handshake_failure_aborts_run() {
    let transport: Arc<dyn Transport> = Arc::new(FailingTransport::new(FailPoint::OpenPublisher));

    let err = Orchestrator::new(stream_config(500, 0), transport)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::Connection { .. }), "{}", err);
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_stops_only_the_sender() {
    let mut config = stream_config(500, 0);
    config.timing.send_interval_ms = 100;
    let transport: Arc<dyn Transport> = Arc::new(FailingTransport::new(FailPoint::PublishAfter(1)));

    let report = Orchestrator::new(config, transport).run().await.unwrap();

    assert_eq!(report.senders_failed, 2);
    assert_eq!(report.receivers_failed, 0);
    assert_eq!(report.stats.total_sent(), 2);
    assert_eq!(report.stats.total_received(), 2);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_start() {
    let mut config = stream_config(500, 0);
    config.participants.total_senders = 0;
    let topic = Arc::new(MemoryTopic::new());
    let transport: Arc<dyn Transport> = topic.clone();

    let err = Orchestrator::new(config, transport).run().await.unwrap_err();

    assert!(matches!(err, BenchError::Configuration(_)), "{}", err);
    assert!(!topic.is_connected());
}

#[tokio::test]
async fn test_mode_backend_mismatch_is_rejected() {
    let mut config = stream_config(500, 0);
    config.mode = DeliveryMode::Lookup;
    let transport: Arc<dyn Transport> = Arc::new(MemoryTopic::new());

    let err = Orchestrator::new(config, transport).run().await.unwrap_err();
    assert!(matches!(err, BenchError::Configuration(_)));
}
