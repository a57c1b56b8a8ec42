use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use sluice_core::Event;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("ingestion queue is closed")]
pub struct QueueClosed;

/// Publisher handle for the FIFO handoff between the publish path and the
/// single consumer. Unbounded: `enqueue` never blocks on backpressure, at
/// the cost of unbounded memory under a slow consumer.
#[derive(Clone)]
pub struct IngestionQueue {
    tx: mpsc::UnboundedSender<Event>,
    depth: Arc<AtomicUsize>,
}

/// The consumer's end. There is exactly one; FIFO order is the channel's.
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
    depth: Arc<AtomicUsize>,
}

pub fn channel() -> (IngestionQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        IngestionQueue {
            tx,
            depth: depth.clone(),
        },
        QueueReceiver { rx, depth },
    )
}

impl IngestionQueue {
    /// Append to the tail. Fails only once the consumer side is gone.
    pub fn enqueue(&self, event: Event) -> Result<(), QueueClosed> {
        // Count before sending so the consumer's decrement can never run
        // ahead of the increment and wrap the gauge.
        self.depth.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_err() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(QueueClosed);
        }
        Ok(())
    }

    /// Items awaiting consumption. Observability only, never flow control.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

impl QueueReceiver {
    /// The sole consumption operation. Suspends until an item is available;
    /// returns `None` once the queue is closed and drained.
    pub async fn dequeue(&mut self) -> Option<Event> {
        let event = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_id: &str) -> Event {
        Event {
            topic: "t".to_string(),
            event_id: event_id.to_string(),
            timestamp: "2025-10-17T01:00:00Z".to_string(),
            source: "test".to_string(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn fifo_order() {
        let (queue, mut rx) = channel();
        for id in ["A", "B", "C"] {
            queue.enqueue(event(id)).unwrap();
        }
        assert_eq!(rx.dequeue().await.unwrap().event_id, "A");
        assert_eq!(rx.dequeue().await.unwrap().event_id, "B");
        assert_eq!(rx.dequeue().await.unwrap().event_id, "C");
    }

    #[tokio::test]
    async fn depth_tracks_enqueue_and_dequeue() {
        let (queue, mut rx) = channel();
        assert_eq!(queue.depth(), 0);
        queue.enqueue(event("A")).unwrap();
        queue.enqueue(event("B")).unwrap();
        assert_eq!(queue.depth(), 2);
        rx.dequeue().await.unwrap();
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn enqueue_after_close_fails() {
        let (queue, rx) = channel();
        drop(rx);
        assert_eq!(queue.enqueue(event("A")), Err(QueueClosed));
    }

    #[tokio::test]
    async fn dequeue_drains_then_none() {
        let (queue, mut rx) = channel();
        queue.enqueue(event("A")).unwrap();
        drop(queue);
        assert!(rx.dequeue().await.is_some());
        assert!(rx.dequeue().await.is_none());
    }
}
