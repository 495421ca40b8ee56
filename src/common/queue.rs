//! Message queues used by the history recorder and the run event bus.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{FlowlineError, Result};

/// Bounded MPSC command queue backed by flume.
///
/// The history recorder owns the receiving side; editors push commands
/// from synchronous code without needing a runtime handle.
pub struct Queue<T> {
    receiver: flume::Receiver<T>,
    sender: flume::Sender<T>,
}

impl<T> Queue<T> {
    /// create a new queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (sender, receiver) = flume::bounded(cap);

        Arc::new(Self {
            receiver,
            sender,
        })
    }

    /// push a message without blocking, failing when the queue is full
    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        self.sender.try_send(msg).map_err(|e| FlowlineError::Queue(e.to_string()))
    }

    /// wait for the next message
    pub async fn next_async(&self) -> Option<T> {
        self.receiver.recv_async().await.ok()
    }
}

/// Broadcast queue for one-to-many run event distribution.
///
/// Publishing with no live subscriber is not an error: run events are
/// best-effort notifications.
pub struct BroadcastQueue<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> BroadcastQueue<T> {
    /// create a new broadcast queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender,
        })
    }

    /// publish a message, returning how many subscribers received it
    pub fn send(
        &self,
        msg: T,
    ) -> usize {
        self.sender.send(msg).unwrap_or(0)
    }

    /// subscribe to the queue
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_send_and_drain() {
        let queue = Queue::new(4);
        queue.send(1).unwrap();
        queue.send(2).unwrap();
        assert_eq!(queue.next_async().await, Some(1));
        assert_eq!(queue.next_async().await, Some(2));
    }

    #[test]
    fn test_queue_full() {
        let queue = Queue::new(1);
        queue.send("a").unwrap();
        assert!(matches!(queue.send("b"), Err(FlowlineError::Queue(_))));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let queue = BroadcastQueue::new(8);
        assert_eq!(queue.send(1u32), 0);

        let mut rx = queue.subscribe();
        assert_eq!(queue.send(2u32), 1);
        assert_eq!(rx.recv().await.unwrap(), 2);
    }
}
