use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sluice_store::EventRepo;

use crate::queue::QueueReceiver;

/// Handle to the single consumer task — the only writer path into the store.
pub struct ConsumerHandle {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConsumerHandle {
    pub fn spawn(repo: EventRepo, rx: QueueReceiver) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(repo, rx, cancel.clone()));
        Self {
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Signal the consumer to stop and wait for it. The in-flight upsert
    /// completes; anything still queued is discarded.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Drain the queue one event at a time. Every upsert error is logged with
/// the offending key and the loop continues — a bad event never halts the
/// consumer, and a failed event is not retried.
async fn run(repo: EventRepo, mut rx: QueueReceiver, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.dequeue() => match maybe {
                Some(event) => event,
                None => break,
            },
        };

        match repo.upsert(&event) {
            Ok(true) => {
                info!(topic = %event.topic, event_id = %event.event_id, "processed");
            }
            Ok(false) => {
                info!(topic = %event.topic, event_id = %event.event_id, "duplicate dropped");
            }
            Err(err) => {
                error!(topic = %event.topic, event_id = %event.event_id, %err, "consumer error");
            }
        }
    }
    info!("consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{self, QueueClosed};
    use serde_json::json;
    use sluice_core::Event;
    use sluice_store::Database;
    use std::time::Duration;

    fn event(event_id: &str, ts: &str) -> Event {
        Event {
            topic: "t".to_string(),
            event_id: event_id.to_string(),
            timestamp: ts.to_string(),
            source: "test".to_string(),
            payload: json!({}),
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn drains_queue_into_store() {
        let repo = EventRepo::new(Database::in_memory().unwrap());
        let (queue, rx) = queue::channel();
        let consumer = ConsumerHandle::spawn(repo.clone(), rx);

        queue.enqueue(event("A", "2025-10-17T01:00:00Z")).unwrap();
        queue.enqueue(event("B", "2025-10-17T02:00:00Z")).unwrap();

        let probe = repo.clone();
        wait_for(move || probe.stats().unwrap().counter("received") == 2).await;
        assert_eq!(repo.list(Some("t"), 100).unwrap().len(), 2);

        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn bad_event_does_not_halt_consumer() {
        let repo = EventRepo::new(Database::in_memory().unwrap());
        let (queue, rx) = queue::channel();
        let consumer = ConsumerHandle::spawn(repo.clone(), rx);

        queue.enqueue(event("BAD", "2025/10/17 00:00:00")).unwrap();
        queue.enqueue(event("GOOD", "2025-10-17T01:00:00Z")).unwrap();

        let probe = repo.clone();
        wait_for(move || probe.stats().unwrap().counter("received") == 2).await;

        // The invalid event was dropped, the one behind it still landed
        let stored = repo.list(Some("t"), 100).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_id, "GOOD");

        let stats = repo.stats().unwrap();
        assert_eq!(stats.counter("unique_processed"), 1);
        assert_eq!(stats.counter("duplicate_dropped"), 0);

        consumer.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let repo = EventRepo::new(Database::in_memory().unwrap());
        let (queue, rx) = queue::channel();
        let consumer = ConsumerHandle::spawn(repo, rx);

        consumer.shutdown().await;
        // Receiver is gone once the task exits
        assert_eq!(queue.enqueue(event("A", "2025-10-17T01:00:00Z")), Err(QueueClosed));
    }
}
