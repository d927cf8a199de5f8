use std::time::Duration;

use paynotify_domain::id::ClientId;
use paynotify_domain::state::QueueState;
use paynotify_queue::domain::repository::QueueStore;
use paynotify_queue::infra::memory::InMemoryQueueStore;
use paynotify_queue::worker::{self, WorkerSchedule};

use paynotify_queue::domain::types::LockThreshold;
use paynotify_queue::usecase::orchestrator::QueueOrchestrator;

use crate::helpers::{
    AllowListEligibility, CHANNEL, KeyedOutbox, RecordingDispatcher, StaticDirectory, deliveries,
    enqueue, orchestrator,
};

async fn states(store: &InMemoryQueueStore) -> Vec<(QueueState, i32)> {
    store
        .entries()
        .unwrap()
        .into_iter()
        .map(|e| (e.state, e.lock_count))
        .collect()
}

// ── send_messages ────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_deliver_client_batch_in_one_message_and_mark_jobs_sent() {
    let store = InMemoryQueueStore::new();
    let ids = vec![
        enqueue(&store, 10, 42).await,
        enqueue(&store, 11, 42).await,
        enqueue(&store, 12, 42).await,
    ];
    let directory = StaticDirectory::default()
        .with_client_contact(42, 7)
        .with_order(10)
        .with_order(11)
        .with_order(12);
    let dispatcher = RecordingDispatcher::default();
    let sent = dispatcher.sent_handle();
    let orchestrator = orchestrator(&store, directory, dispatcher, 3);

    let report = orchestrator.send_messages(CHANNEL).await.unwrap();

    assert_eq!(report.clients, 1);
    assert_eq!(report.sent_jobs, ids);
    assert!(report.failed_clients.is_empty());
    assert_eq!(deliveries(&sent), vec![(7, vec![10, 11, 12])]);
    assert_eq!(states(&store).await, vec![(QueueState::Sent, 1); 3]);
    assert!(
        store
            .list_clients_with_queued_jobs(CHANNEL)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn should_send_overlapping_recipient_a_single_combined_digest() {
    let store = InMemoryQueueStore::new();
    enqueue(&store, 1, 42).await;
    enqueue(&store, 2, 42).await;
    // order 1 -> {A=100, B=200}, order 2 -> {B=200, C=300}
    let directory = StaticDirectory::default()
        .with_curator(1, 100)
        .with_curator(1, 200)
        .with_curator(2, 200)
        .with_curator(2, 300)
        .with_order(1)
        .with_order(2);
    let dispatcher = RecordingDispatcher::default();
    let sent = dispatcher.sent_handle();
    let orchestrator = orchestrator(&store, directory, dispatcher, 3);

    let report = orchestrator.send_messages(CHANNEL).await.unwrap();

    assert_eq!(report.messages, 3);
    assert_eq!(
        deliveries(&sent),
        vec![(100, vec![1]), (200, vec![1, 2]), (300, vec![2])]
    );
}

#[tokio::test]
async fn should_keep_jobs_locked_when_delivery_fails_and_continue_with_other_clients() {
    let store = InMemoryQueueStore::new();
    let broken = enqueue(&store, 10, 42).await;
    let healthy = enqueue(&store, 20, 43).await;
    let directory = StaticDirectory::default()
        .with_client_contact(42, 7)
        .with_client_contact(43, 8)
        .with_order(10)
        .with_order(20)
        .failing_for(42);
    let dispatcher = RecordingDispatcher::default();
    let sent = dispatcher.sent_handle();
    let orchestrator = orchestrator(&store, directory, dispatcher, 3);

    let report = orchestrator.send_messages(CHANNEL).await.unwrap();

    assert_eq!(report.failed_clients, vec![ClientId(42)]);
    assert_eq!(report.sent_jobs, vec![healthy]);
    assert_eq!(deliveries(&sent), vec![(8, vec![20])]);
    let broken_entry = store.find_by_id(broken).await.unwrap().unwrap();
    assert_eq!((broken_entry.state, broken_entry.lock_count), (QueueState::Locked, 1));
}

#[tokio::test]
async fn should_mark_jobs_sent_when_nobody_is_interested() {
    let store = InMemoryQueueStore::new();
    enqueue(&store, 10, 42).await;
    let dispatcher = RecordingDispatcher::default();
    let sent = dispatcher.sent_handle();
    let orchestrator = orchestrator(&store, StaticDirectory::default(), dispatcher, 3);

    let report = orchestrator.send_messages(CHANNEL).await.unwrap();

    assert_eq!(report.messages, 0);
    assert_eq!(report.sent_jobs.len(), 1);
    assert!(deliveries(&sent).is_empty());
    assert_eq!(states(&store).await, vec![(QueueState::Sent, 1)]);
}

// ── Crash recovery ───────────────────────────────────────────────────────────

#[tokio::test]
async fn should_retry_failed_batch_until_threshold_then_give_up() {
    let store = InMemoryQueueStore::new();
    for order in [10, 11, 12] {
        enqueue(&store, order, 42).await;
    }
    let directory = StaticDirectory::default()
        .with_client_contact(42, 7)
        .with_order(10)
        .with_order(11)
        .with_order(12);
    let orchestrator = orchestrator(&store, directory, RecordingDispatcher::failing(), 3);

    for attempt in 1..=3 {
        let report = orchestrator.send_messages(CHANNEL).await.unwrap();
        assert_eq!(report.failed_clients, vec![ClientId(42)]);
        assert_eq!(states(&store).await, vec![(QueueState::Locked, attempt); 3]);

        let maintenance = orchestrator.manage_queue(CHANNEL).await.unwrap();
        if attempt < 3 {
            assert_eq!(maintenance.reclaimed.len(), 3);
            assert_eq!(states(&store).await, vec![(QueueState::Queued, attempt); 3]);
        } else {
            assert_eq!(maintenance.failed.len(), 3);
        }
    }

    assert_eq!(states(&store).await, vec![(QueueState::Failed, 3); 3]);
    let report = orchestrator.send_messages(CHANNEL).await.unwrap();
    assert_eq!(report.clients, 0);
}

#[tokio::test]
async fn should_redeliver_batch_abandoned_by_crashed_worker() {
    let store = InMemoryQueueStore::new();
    enqueue(&store, 10, 42).await;
    // a worker locked the batch and died before finalizing
    store.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap();

    let directory = StaticDirectory::default()
        .with_client_contact(42, 7)
        .with_order(10);
    let dispatcher = RecordingDispatcher::default();
    let sent = dispatcher.sent_handle();
    let orchestrator = orchestrator(&store, directory, dispatcher, 3);

    assert_eq!(orchestrator.send_messages(CHANNEL).await.unwrap().clients, 0);
    orchestrator.manage_queue(CHANNEL).await.unwrap();
    orchestrator.send_messages(CHANNEL).await.unwrap();

    assert_eq!(deliveries(&sent), vec![(7, vec![10])]);
    assert_eq!(states(&store).await, vec![(QueueState::Sent, 2)]);
}

#[tokio::test]
async fn should_write_one_outbox_row_per_recipient_when_batch_is_redelivered() {
    let store = InMemoryQueueStore::new();
    enqueue(&store, 10, 42).await;
    enqueue(&store, 11, 42).await;
    let directory = StaticDirectory::default()
        .with_curator(10, 1)
        .with_curator(11, 2)
        .with_order(10)
        .with_order(11);
    // recipient 1 is written, recipient 2 fails on the first attempt
    let outbox = KeyedOutbox::failing_on_attempt(2);
    let rows = outbox.rows.clone();
    let attempts = outbox.attempts.clone();
    let orchestrator = QueueOrchestrator::new(
        store.clone(),
        directory.clone(),
        AllowListEligibility::default(),
        directory,
        outbox,
        LockThreshold::new(3).unwrap(),
    );

    let first = orchestrator.send_messages(CHANNEL).await.unwrap();
    assert_eq!(first.failed_clients, vec![ClientId(42)]);
    assert_eq!(rows.lock().unwrap().len(), 1);

    orchestrator.manage_queue(CHANNEL).await.unwrap();
    let second = orchestrator.send_messages(CHANNEL).await.unwrap();
    assert!(second.failed_clients.is_empty());

    assert_eq!(*attempts.lock().unwrap(), 4);
    let rows = rows.lock().unwrap();
    let recipients: Vec<i64> = rows.values().map(|m| m.recipient.id.0).collect();
    assert_eq!(rows.len(), 2);
    assert!(recipients.contains(&1) && recipients.contains(&2));
    assert_eq!(states(&store).await, vec![(QueueState::Sent, 2); 2]);
}

// ── Worker loop ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_run_cycles_until_shutdown() {
    let store = InMemoryQueueStore::new();
    enqueue(&store, 10, 42).await;
    let directory = StaticDirectory::default()
        .with_client_contact(42, 7)
        .with_order(10);
    let dispatcher = RecordingDispatcher::default();
    let sent = dispatcher.sent_handle();
    let orchestrator = orchestrator(&store, directory, dispatcher, 3);
    let schedule = WorkerSchedule {
        channels: vec![CHANNEL],
        delivery_interval: Duration::from_millis(10),
        maintenance_interval: Duration::from_millis(10),
    };

    worker::run(
        &orchestrator,
        &schedule,
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await;

    assert_eq!(deliveries(&sent), vec![(7, vec![10])]);
    assert_eq!(states(&store).await, vec![(QueueState::Sent, 1)]);
}
