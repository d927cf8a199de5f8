use std::collections::HashSet;
use std::sync::Arc;

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, OrderId};
use paynotify_domain::state::{QueueState, TerminalState};
use paynotify_queue::domain::repository::QueueStore;
use paynotify_queue::domain::types::{LockThreshold, NewQueueEntry};
use paynotify_queue::error::QueueServiceError;
use paynotify_queue::infra::memory::InMemoryQueueStore;
use paynotify_queue::usecase::lease::LeaseManager;

use crate::helpers::{CHANNEL, enqueue};

async fn state_of(store: &InMemoryQueueStore, id: JobId) -> (QueueState, i32) {
    let entry = store.find_by_id(id).await.unwrap().unwrap();
    (entry.state, entry.lock_count)
}

// ── Enqueue ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_reject_duplicate_queued_entry_for_order_and_client() {
    let store = InMemoryQueueStore::new();
    enqueue(&store, 10, 42).await;

    let result = store
        .enqueue(&NewQueueEntry {
            order_id: OrderId(10),
            client_id: ClientId(42),
            channel: CHANNEL,
        })
        .await;
    assert!(
        matches!(
            result,
            Err(QueueServiceError::AlreadyQueued {
                order_id: OrderId(10),
                client_id: ClientId(42)
            })
        ),
        "expected AlreadyQueued, got {result:?}"
    );

    // same order for another client is a separate obligation
    enqueue(&store, 10, 43).await;
}

// ── Lock ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_lock_all_queued_jobs_of_client_and_bump_lock_count() {
    let store = InMemoryQueueStore::new();
    let a = enqueue(&store, 10, 42).await;
    let b = enqueue(&store, 11, 42).await;

    let locked = store.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap();

    assert_eq!(locked, vec![a, b]);
    assert_eq!(state_of(&store, a).await, (QueueState::Locked, 1));
    assert_eq!(state_of(&store, b).await, (QueueState::Locked, 1));
    assert!(
        store
            .list_clients_with_queued_jobs(CHANNEL)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn should_return_nothing_when_client_has_no_queued_jobs() {
    let store = InMemoryQueueStore::new();
    enqueue(&store, 10, 42).await;
    store.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap();

    let second = store.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_hand_each_job_to_exactly_one_concurrent_locker() {
    let store = Arc::new(InMemoryQueueStore::new());
    let mut expected = HashSet::new();
    for order in 0..50 {
        expected.insert(enqueue(&store, order, 42).await);
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "job {id} locked twice");
        }
    }
    assert_eq!(seen, expected);
    for id in seen {
        assert_eq!(state_of(&store, id).await, (QueueState::Locked, 1));
    }
}

// ── Finalize ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_finalize_idempotently() {
    let store = InMemoryQueueStore::new();
    let a = enqueue(&store, 10, 42).await;
    let b = enqueue(&store, 11, 42).await;
    let locked = store.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap();

    assert_eq!(store.finalize(&locked, TerminalState::Sent).await.unwrap(), 2);
    assert_eq!(store.finalize(&locked, TerminalState::Sent).await.unwrap(), 0);
    assert_eq!(store.finalize(&locked, TerminalState::Failed).await.unwrap(), 0);

    assert_eq!(state_of(&store, a).await, (QueueState::Sent, 1));
    assert_eq!(state_of(&store, b).await, (QueueState::Sent, 1));
}

#[tokio::test]
async fn should_ignore_unknown_ids_on_finalize() {
    let store = InMemoryQueueStore::new();
    let a = enqueue(&store, 10, 42).await;

    let changed = store
        .finalize(&[a, JobId(404)], TerminalState::Skipped)
        .await
        .unwrap();

    assert_eq!(changed, 1);
    assert_eq!(state_of(&store, a).await.0, QueueState::Skipped);
}

// ── Reclaim / fail ───────────────────────────────────────────────────────────

#[tokio::test]
async fn should_count_each_lock_and_fail_once_threshold_is_reached() {
    let store = InMemoryQueueStore::new();
    let job = enqueue(&store, 10, 42).await;
    let lease = LeaseManager {
        store: store.clone(),
        threshold: LockThreshold::new(3).unwrap(),
    };

    for cycle in 1..=3 {
        assert_eq!(
            lease.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap(),
            vec![job]
        );
        assert_eq!(state_of(&store, job).await, (QueueState::Locked, cycle));

        let report = lease.maintain(CHANNEL).await.unwrap();
        if cycle < 3 {
            assert_eq!(report.reclaimed, vec![job]);
            assert!(report.failed.is_empty());
            assert_eq!(state_of(&store, job).await, (QueueState::Queued, cycle));
        } else {
            assert!(report.reclaimed.is_empty());
            assert_eq!(report.failed, vec![job]);
        }
    }

    assert_eq!(state_of(&store, job).await, (QueueState::Failed, 3));
    assert!(
        lease
            .lock_client_jobs(ClientId(42), CHANNEL)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn should_fail_immediately_with_threshold_of_one() {
    let store = InMemoryQueueStore::new();
    let job = enqueue(&store, 10, 42).await;
    let lease = LeaseManager {
        store: store.clone(),
        threshold: LockThreshold::new(1).unwrap(),
    };

    lease.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap();
    let report = lease.maintain(CHANNEL).await.unwrap();

    assert_eq!(report.failed, vec![job]);
    assert_eq!(state_of(&store, job).await, (QueueState::Failed, 1));
}

#[tokio::test]
async fn should_leave_queued_and_terminal_jobs_alone_during_maintenance() {
    let store = InMemoryQueueStore::new();
    let queued = enqueue(&store, 10, 42).await;
    let sent = enqueue(&store, 11, 43).await;
    store.lock_client_jobs(ClientId(43), CHANNEL).await.unwrap();
    store.finalize(&[sent], TerminalState::Sent).await.unwrap();

    let lease = LeaseManager {
        store: store.clone(),
        threshold: LockThreshold::default(),
    };
    let report = lease.maintain(CHANNEL).await.unwrap();

    assert!(report.reclaimed.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(state_of(&store, queued).await, (QueueState::Queued, 0));
    assert_eq!(state_of(&store, sent).await, (QueueState::Sent, 1));
}

#[tokio::test]
async fn should_scope_maintenance_to_one_channel() {
    let store = InMemoryQueueStore::new();
    let gp = store
        .enqueue(&NewQueueEntry {
            order_id: OrderId(10),
            client_id: ClientId(42),
            channel: Channel::GpToCarrier,
        })
        .await
        .unwrap();
    store
        .lock_client_jobs(ClientId(42), Channel::GpToCarrier)
        .await
        .unwrap();

    let lease = LeaseManager {
        store: store.clone(),
        threshold: LockThreshold::default(),
    };
    let report = lease.maintain(CHANNEL).await.unwrap();

    assert!(report.reclaimed.is_empty());
    assert_eq!(state_of(&store, gp).await, (QueueState::Locked, 1));
}

#[tokio::test]
async fn should_skip_stale_lock_when_order_was_queued_again() {
    let store = InMemoryQueueStore::new();
    let stale = enqueue(&store, 10, 42).await;
    store.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap();
    let fresh = enqueue(&store, 10, 42).await;

    let lease = LeaseManager {
        store: store.clone(),
        threshold: LockThreshold::default(),
    };
    let report = lease.maintain(CHANNEL).await.unwrap();

    assert_eq!(report.superseded, vec![stale]);
    assert!(report.reclaimed.is_empty());
    assert_eq!(state_of(&store, stale).await.0, QueueState::Skipped);
    assert_eq!(state_of(&store, fresh).await, (QueueState::Queued, 0));
}

#[tokio::test]
async fn should_keep_lock_when_same_order_is_queued_on_another_channel() {
    let store = InMemoryQueueStore::new();
    let consignor = enqueue(&store, 10, 42).await;
    store.lock_client_jobs(ClientId(42), CHANNEL).await.unwrap();
    let gp = store
        .enqueue(&NewQueueEntry {
            order_id: OrderId(10),
            client_id: ClientId(42),
            channel: Channel::GpToCarrier,
        })
        .await
        .unwrap();

    let lease = LeaseManager {
        store: store.clone(),
        threshold: LockThreshold::default(),
    };
    let report = lease.maintain(CHANNEL).await.unwrap();

    assert!(report.superseded.is_empty());
    assert!(report.reclaimed.is_empty());
    assert_eq!(state_of(&store, consignor).await, (QueueState::Locked, 1));

    // once the other channel picks up its row the pair is free to queue again
    store
        .lock_client_jobs(ClientId(42), Channel::GpToCarrier)
        .await
        .unwrap();
    let report = lease.maintain(CHANNEL).await.unwrap();

    assert_eq!(report.reclaimed, vec![consignor]);
    assert_eq!(state_of(&store, consignor).await, (QueueState::Queued, 1));
    assert_eq!(state_of(&store, gp).await, (QueueState::Locked, 1));
}
