//! Bounded in-memory buffer between the intake handler and the forwarder.
//!
//! Many request handlers enqueue, one forwarder dequeues. Enqueue never
//! waits: when the buffer is full the notification is handed back to the
//! caller. Dequeue suspends until a notification is available or every
//! sender has been dropped.

use std::num::NonZeroUsize;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use super::types::Notification;

/// Reasons a notification could not be enqueued.
///
/// The rejected notification is returned so the caller can log it.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("notification buffer is full")]
    Full(Notification),

    #[error("notification buffer is closed")]
    Closed(Notification),
}

/// Create a bounded buffer holding at most `capacity` notifications.
pub fn channel(capacity: NonZeroUsize) -> (BufferSender, BufferReceiver) {
    let (tx, rx) = mpsc::channel(capacity.get());
    (BufferSender { tx }, BufferReceiver { rx })
}

/// Producer half, cloned into every request handler.
#[derive(Debug, Clone)]
pub struct BufferSender {
    tx: mpsc::Sender<Notification>,
}

impl BufferSender {
    /// Try to append a notification without waiting.
    pub fn try_enqueue(&self, notification: Notification) -> Result<(), EnqueueError> {
        self.tx.try_send(notification).map_err(|e| match e {
            TrySendError::Full(n) => EnqueueError::Full(n),
            TrySendError::Closed(n) => EnqueueError::Closed(n),
        })
    }

    /// Number of notifications currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of notifications the buffer holds.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half, owned by the forwarder.
#[derive(Debug)]
pub struct BufferReceiver {
    rx: mpsc::Receiver<Notification>,
}

impl BufferReceiver {
    /// Remove the oldest notification, waiting while the buffer is empty.
    ///
    /// Returns `None` once every sender is gone and the buffer is drained.
    pub async fn dequeue(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Remove the oldest notification if one is buffered right now.
    pub fn try_dequeue(&mut self) -> Option<Notification> {
        match self.rx.try_recv() {
            Ok(n) => Some(n),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Stop accepting new notifications. Already buffered ones stay readable.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Number;

    fn notification(number: u64) -> Notification {
        Notification::new(number, "STARTED", "http://ci/job/1", "job", "http://ci/job/")
    }

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo() {
        let (tx, mut rx) = channel(capacity(3));

        for i in 0..3 {
            tx.try_enqueue(notification(i)).unwrap();
        }

        for i in 0..3u64 {
            let n = rx.dequeue().await.unwrap();
            assert_eq!(n.build.number, Number::from(i));
        }
    }

    #[tokio::test]
    async fn test_enqueue_rejects_when_full() {
        let (tx, _rx) = channel(capacity(2));

        tx.try_enqueue(notification(1)).unwrap();
        tx.try_enqueue(notification(2)).unwrap();

        match tx.try_enqueue(notification(3)) {
            Err(EnqueueError::Full(n)) => assert_eq!(n.build.number, Number::from(3u64)),
            other => panic!("Expected Full, got {:?}", other),
        }
        assert_eq!(tx.len(), 2);
        assert_eq!(tx.capacity(), 2);
    }

    #[tokio::test]
    async fn test_full_buffer_keeps_oldest_entries() {
        let (tx, mut rx) = channel(capacity(1));

        tx.try_enqueue(notification(1)).unwrap();
        assert!(tx.try_enqueue(notification(2)).is_err());

        assert_eq!(rx.try_dequeue().unwrap().build.number, Number::from(1u64));
        assert!(rx.try_dequeue().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_after_close_is_rejected() {
        let (tx, mut rx) = channel(capacity(2));
        tx.try_enqueue(notification(1)).unwrap();

        rx.close();

        assert!(matches!(
            tx.try_enqueue(notification(2)),
            Err(EnqueueError::Closed(_))
        ));
        assert_eq!(rx.dequeue().await.unwrap().build.number, Number::from(1u64));
        assert!(rx.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_ends_when_senders_dropped() {
        let (tx, mut rx) = channel(capacity(2));
        tx.try_enqueue(notification(1)).unwrap();
        drop(tx);

        assert!(rx.dequeue().await.is_some());
        assert!(rx.dequeue().await.is_none());
    }
}
