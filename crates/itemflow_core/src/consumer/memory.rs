//! In-process at-least-once transport.

use super::{ConsumerError, Delivery, MessageSource};
use crate::config::ConsumeConfig;
use crate::messaging::publisher::{MessageSink, PublishError};
use async_trait::async_trait;
use log::warn;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Message dropped after exhausting its delivery attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: u64,
    pub body: Vec<u8>,
    pub attempts: u32,
}

/// Snapshot of queue state for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub ready: usize,
    pub in_flight: usize,
    pub acked: u64,
    pub requeued: u64,
    pub dead_lettered: usize,
}

#[derive(Debug, Clone)]
struct Pending {
    id: u64,
    body: Arc<[u8]>,
    attempts: u32,
}

struct QueueState {
    ready: VecDeque<Pending>,
    in_flight: usize,
    closed: bool,
    next_id: u64,
    acked: u64,
    requeued: u64,
    dead: Vec<DeadLetter>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    notify: Notify,
    max_attempts: u32,
}

enum Settlement {
    Ack,
    Requeue,
}

impl QueueInner {
    fn settle(&self, message: &Pending, settlement: Settlement) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            match settlement {
                Settlement::Ack => state.acked += 1,
                Settlement::Requeue if message.attempts >= self.max_attempts => {
                    warn!(
                        "event=message_dead_lettered module=queue status=dead delivery_id={} attempts={}",
                        message.id, message.attempts
                    );
                    state.dead.push(DeadLetter {
                        id: message.id,
                        body: message.body.to_vec(),
                        attempts: message.attempts,
                    });
                }
                Settlement::Requeue => {
                    state.requeued += 1;
                    state.ready.push_back(message.clone());
                }
            }
        }
        self.notify.notify_waiters();
    }
}

/// FIFO queue with redelivery and a dead-letter list.
///
/// Receivers get `None` only after `close()` once nothing is ready or in
/// flight, so requeued messages are still drained after close.
#[derive(Clone)]
pub struct InMemoryQueue {
    inner: Arc<QueueInner>,
}

impl InMemoryQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    ready: VecDeque::new(),
                    in_flight: 0,
                    closed: false,
                    next_id: 1,
                    acked: 0,
                    requeued: 0,
                    dead: Vec::new(),
                }),
                notify: Notify::new(),
                max_attempts: max_attempts.max(1),
            }),
        }
    }

    pub fn from_config(config: &ConsumeConfig) -> Self {
        Self::new(config.max_attempts)
    }

    /// Appends a message and returns its delivery id.
    pub fn enqueue(&self, body: impl Into<Vec<u8>>) -> Result<u64, ConsumerError> {
        let id = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(ConsumerError::SourceClosed);
            }
            let id = state.next_id;
            state.next_id += 1;
            state.ready.push_back(Pending {
                id,
                body: Arc::from(body.into()),
                attempts: 0,
            });
            id
        };
        self.inner.notify.notify_waiters();
        Ok(id)
    }

    /// Rejects further enqueues; receivers finish once drained.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.inner.state.lock();
        QueueCounts {
            ready: state.ready.len(),
            in_flight: state.in_flight,
            acked: state.acked,
            requeued: state.requeued,
            dead_lettered: state.dead.len(),
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.state.lock().dead.clone()
    }

    pub fn max_attempts(&self) -> u32 {
        self.inner.max_attempts
    }
}

#[async_trait]
impl MessageSource for InMemoryQueue {
    async fn receive(&self) -> Option<Box<dyn Delivery>> {
        loop {
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            // Register before inspecting state so a concurrent notify is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if let Some(mut message) = state.ready.pop_front() {
                    message.attempts += 1;
                    state.in_flight += 1;
                    return Some(Box::new(MemoryDelivery {
                        queue: Arc::clone(&self.inner),
                        message,
                        settled: false,
                    }));
                }
                if state.closed && state.in_flight == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }
}

impl MessageSink for InMemoryQueue {
    fn publish(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        self.enqueue(payload)
            .map(|_| ())
            .map_err(|err| PublishError::Sink(err.to_string()))
    }
}

/// Delivery handed out by `InMemoryQueue`. Dropping it unsettled requeues.
struct MemoryDelivery {
    queue: Arc<QueueInner>,
    message: Pending,
    settled: bool,
}

impl MemoryDelivery {
    fn settle(&mut self, settlement: Settlement) {
        if self.settled {
            return;
        }
        self.settled = true;
        self.queue.settle(&self.message, settlement);
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn id(&self) -> u64 {
        self.message.id
    }

    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn attempts(&self) -> u32 {
        self.message.attempts
    }

    async fn ack(mut self: Box<Self>) -> Result<(), ConsumerError> {
        self.settle(Settlement::Ack);
        Ok(())
    }

    async fn requeue(mut self: Box<Self>) -> Result<(), ConsumerError> {
        self.settle(Settlement::Requeue);
        Ok(())
    }
}

impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        self.settle(Settlement::Requeue);
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryQueue;
    use crate::consumer::{ConsumerError, Delivery, MessageSource};

    #[tokio::test]
    async fn requeue_past_limit_dead_letters() {
        let queue = InMemoryQueue::new(2);
        queue.enqueue(b"payload".to_vec()).unwrap();
        queue.close();

        let first = queue.receive().await.unwrap();
        assert_eq!(first.attempts(), 1);
        first.requeue().await.unwrap();

        let second = queue.receive().await.unwrap();
        assert_eq!(second.attempts(), 2);
        second.requeue().await.unwrap();

        assert!(queue.receive().await.is_none());
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body, b"payload".to_vec());
        assert_eq!(queue.counts().requeued, 1);
    }

    #[tokio::test]
    async fn dropped_delivery_is_redelivered() {
        let queue = InMemoryQueue::new(3);
        let id = queue.enqueue(b"x".to_vec()).unwrap();
        drop(queue.receive().await.unwrap());

        let again = queue.receive().await.unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(again.attempts(), 2);
        again.ack().await.unwrap();
        assert_eq!(queue.counts().acked, 1);
    }

    #[test]
    fn closed_queue_rejects_enqueue() {
        let queue = InMemoryQueue::new(1);
        queue.close();
        assert!(matches!(
            queue.enqueue(b"late".to_vec()),
            Err(ConsumerError::SourceClosed)
        ));
    }
}
