use anyhow::anyhow;
use reliable_delivery::{
    InMemoryDedupe, ManualClock, NotificationDispatcher, NotificationQueue,
    NotificationStatus, QueuedNotification, ReliabilityConfig, RetryPolicy, RetryingHandler,
    TransactionManager,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_delay_millis: 5,
        max_delay_millis: 50,
        backoff_multiplier: 2.0,
    }
}

/// Duplicate confirmations are dropped before the queue, the rest are
/// delivered through a flaky provider.
#[tokio::test(start_paused = true)]
async fn dedup_queue_and_resilient_send() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let dedupe = Arc::new(InMemoryDedupe::with_clock(clock.clone()));
    let queue = Arc::new(NotificationQueue::with_clock(clock.clone()));
    let config = ReliabilityConfig {
        dedup_window_millis: 60_000,
        max_attempts: 2,
        ..ReliabilityConfig::default()
    };
    let dispatcher = NotificationDispatcher::from_config(&config, dedupe, queue.clone());

    let provider_calls = Arc::new(AtomicU32::new(0));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::clone(&provider_calls);
    let sink = Arc::clone(&delivered);
    let provider = move |n: QueuedNotification| {
        let calls = Arc::clone(&calls);
        let sink = Arc::clone(&sink);
        async move {
            // every other call times out
            if calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                return Err(anyhow!("whatsapp cloud api timeout"));
            }
            sink.lock().unwrap().push(n.recipient.to_string());
            Ok(())
        }
    };
    queue.register_send_handler(RetryingHandler::new(provider, fast_policy()));

    for recipient in ["34600000001", "34600000002", "34600000001"] {
        dispatcher
            .dispatch("whatsapp", recipient, Some("evento-7"), json!({ "template": "confirmacion" }))
            .unwrap();
    }
    assert_eq!(queue.len(), 2);

    let summary = queue.process_pending_notifications().await;

    assert_eq!(summary.sent, 2);
    assert_eq!(provider_calls.load(Ordering::SeqCst), 4);
    let delivered: HashSet<String> = delivered.lock().unwrap().iter().cloned().collect();
    assert_eq!(
        delivered,
        HashSet::from(["34600000001".to_string(), "34600000002".to_string()])
    );
    assert!(queue.get_queue().iter().all(|n| n.status == NotificationStatus::Sent));
}

/// A notification that keeps failing ends in the dead-letter queue with its
/// last error, ready for an operator.
#[tokio::test(start_paused = true)]
async fn exhausted_notification_reaches_dead_letter_queue() {
    let queue = NotificationQueue::new();
    queue.register_send_handler(|_n: QueuedNotification| async move {
        Err::<(), _>(anyhow!("invalid recipient"))
    });
    let n = queue.enqueue_with_max_attempts("email", "staff@example.com", json!({}), 3);

    for _ in 0..5 {
        queue.process_pending_notifications().await;
    }

    let dead = queue.get_dead_letter_queue();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, n.id);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(dead[0].error.as_deref(), Some("invalid recipient"));
    assert_eq!(queue.stats().attempts, 3);
}

/// Creating a chat group, notifying staff and confirming the assignment;
/// the confirmation fails so the earlier side effects are undone newest first.
#[tokio::test]
async fn saga_undoes_group_and_notification() {
    let groups = Arc::new(Mutex::new(HashSet::new()));
    let queue = Arc::new(NotificationQueue::new());
    let undo_log = Arc::new(Mutex::new(Vec::new()));
    let mut tx = TransactionManager::new("assign_event_staff");

    let g = Arc::clone(&groups);
    let group_id = tx
        .execute_with_rollback(
            || async move {
                g.lock().unwrap().insert("evento-7".to_string());
                Ok::<_, anyhow::Error>("evento-7".to_string())
            },
            {
                let groups = Arc::clone(&groups);
                let log = Arc::clone(&undo_log);
                move || async move {
                    groups.lock().unwrap().remove("evento-7");
                    log.lock().unwrap().push("delete_group");
                    Ok(())
                }
            },
        )
        .await
        .unwrap();

    let q = Arc::clone(&queue);
    let notification = tx
        .execute_with_rollback(
            || async move { Ok::<_, anyhow::Error>(q.enqueue("whatsapp", "34600000001", json!({ "group": group_id }))) },
            {
                let queue = Arc::clone(&queue);
                let log = Arc::clone(&undo_log);
                move || async move {
                    queue.clear_queue();
                    log.lock().unwrap().push("drop_notification");
                    Err(anyhow!("queue already drained"))
                }
            },
        )
        .await
        .unwrap();
    assert_eq!(notification.status, NotificationStatus::Pending);

    let err = tx
        .execute(|| async { Err::<(), _>(anyhow!("assignment update rejected")) })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "assignment update rejected");
    assert_eq!(*undo_log.lock().unwrap(), vec!["drop_notification", "delete_group"]);
    assert!(groups.lock().unwrap().is_empty());
    assert!(queue.is_empty());
}
