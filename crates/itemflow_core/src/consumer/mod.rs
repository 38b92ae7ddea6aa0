//! Queue consumer: a fixed pool of workers feeding deliveries to a processor.
//!
//! # Responsibility
//! - Pull deliveries from a `MessageSource` and run the processor on the
//!   blocking pool.
//! - Map processor outcomes to ack / requeue.
//! - Stop on an explicit shutdown signal with a bounded drain.
//!
//! # Invariants
//! - Each worker handles one delivery at a time.
//! - Permanent failures and duplicates are acked; only retryable failures
//!   are requeued. Attempt limits belong to the transport.
//! - Shutdown stops taking new deliveries; in-flight work finishes within the
//!   grace period or its worker is aborted.

mod memory;

pub use memory::{DeadLetter, InMemoryQueue, QueueCounts};

use crate::config::ConsumeConfig;
use crate::messaging::envelope::{self, EnvelopeError};
use crate::service::processor::MessageProcessor;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer already started")]
    AlreadyStarted,
    #[error("consumer was shut down before it started")]
    ShutDown,
    #[error("message source is closed")]
    SourceClosed,
    #[error("failed to settle delivery {delivery_id}: {reason}")]
    Settle { delivery_id: u64, reason: String },
    #[error("{aborted} worker(s) still busy after {grace:?} grace period; aborted")]
    ShutdownTimeout { grace: Duration, aborted: usize },
}

/// One received message. The worker owns it and must `ack` or `requeue`.
#[async_trait]
pub trait Delivery: Send {
    /// Transport-assigned delivery id, used in log events.
    fn id(&self) -> u64;
    fn body(&self) -> &[u8];
    /// Delivery attempts so far, including this one.
    fn attempts(&self) -> u32;

    async fn ack(self: Box<Self>) -> Result<(), ConsumerError>;

    /// Hands the message back to the transport for redelivery.
    async fn requeue(self: Box<Self>) -> Result<(), ConsumerError>;
}

/// Transport seam for incoming messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Waits for the next delivery; `None` once the source is closed and
    /// drained. Must be cancel-safe.
    async fn receive(&self) -> Option<Box<dyn Delivery>>;
}

/// Cloneable trigger for a consumer's shutdown signal.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Worker group driving a processor from a message source.
pub struct Consumer {
    source: Arc<dyn MessageSource>,
    processor: Arc<dyn MessageProcessor>,
    workers: usize,
    shutdown_grace: Duration,
    shutdown: ShutdownHandle,
    joins: Vec<JoinHandle<()>>,
}

impl Consumer {
    pub fn new(
        source: Arc<dyn MessageSource>,
        processor: Arc<dyn MessageProcessor>,
        config: &ConsumeConfig,
    ) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            source,
            processor,
            workers: config.workers.max(1),
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
            joins: Vec::new(),
        }
    }

    /// Spawns the workers on the current tokio runtime.
    ///
    /// # Errors
    /// - `AlreadyStarted` on a second call.
    /// - `ShutDown` when shutdown was requested before start.
    pub fn start(&mut self) -> Result<(), ConsumerError> {
        if !self.joins.is_empty() {
            return Err(ConsumerError::AlreadyStarted);
        }
        if self.shutdown.is_triggered() {
            return Err(ConsumerError::ShutDown);
        }

        for worker_id in 0..self.workers {
            let source = Arc::clone(&self.source);
            let processor = Arc::clone(&self.processor);
            let shutdown_rx = self.shutdown.tx.subscribe();
            self.joins.push(tokio::spawn(async move {
                worker_loop(worker_id, source, processor, shutdown_rx).await;
            }));
        }

        info!(
            "event=consumer_start module=consumer status=ok workers={}",
            self.workers
        );
        Ok(())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Asks workers to stop taking deliveries. In-flight work is not cancelled.
    pub fn request_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Grace period taken from configuration.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn running_workers(&self) -> usize {
        self.joins.iter().filter(|join| !join.is_finished()).count()
    }

    /// Waits until every worker has exited, either because the source
    /// drained or because shutdown was requested. Cancel-safe.
    pub async fn wait(&mut self) {
        while let Some(join) = self.joins.last_mut() {
            if let Err(err) = join.await {
                error!(
                    "event=worker_exit module=consumer status=error error={}",
                    err
                );
            }
            self.joins.pop();
        }
    }

    /// Requests shutdown and waits at most `grace` for workers to finish.
    ///
    /// # Errors
    /// - `ShutdownTimeout` when workers were still busy and had to be aborted.
    ///   Deliveries they held go back to the transport.
    pub async fn stop(mut self, grace: Duration) -> Result<(), ConsumerError> {
        self.request_shutdown();
        let aborts = self
            .joins
            .iter()
            .map(JoinHandle::abort_handle)
            .collect::<Vec<_>>();

        if tokio::time::timeout(grace, self.wait()).await.is_ok() {
            info!("event=consumer_stop module=consumer status=ok");
            return Ok(());
        }

        let aborted = self.joins.len();
        for abort in aborts {
            abort.abort();
        }
        self.joins.clear();
        warn!(
            "event=consumer_stop module=consumer status=timeout aborted={} grace_ms={}",
            aborted,
            grace.as_millis()
        );
        Err(ConsumerError::ShutdownTimeout { grace, aborted })
    }
}

async fn worker_loop(
    worker_id: usize,
    source: Arc<dyn MessageSource>,
    processor: Arc<dyn MessageProcessor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let delivery = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            delivery = source.receive() => delivery,
        };

        let Some(delivery) = delivery else {
            debug!(
                "event=worker_exit module=consumer status=drained worker={}",
                worker_id
            );
            break;
        };

        handle_delivery(worker_id, &processor, delivery).await;
    }
}

async fn handle_delivery(
    worker_id: usize,
    processor: &Arc<dyn MessageProcessor>,
    delivery: Box<dyn Delivery>,
) {
    let delivery_id = delivery.id();
    let attempts = delivery.attempts();

    if delivery.body().is_empty() {
        warn!(
            "event=delivery_skipped module=consumer status=acked worker={} delivery_id={} reason=empty_body",
            worker_id, delivery_id
        );
        report_settle(worker_id, delivery.ack().await);
        return;
    }

    let body = delivery.body().to_vec();
    let processor = Arc::clone(processor);
    let outcome = tokio::task::spawn_blocking(move || processor.handle(&body)).await;

    let settled = match outcome {
        Ok(Ok(())) => delivery.ack().await,
        Ok(Err(err)) if err.is_retryable() => {
            warn!(
                "event=delivery_failed module=consumer status=requeued worker={} delivery_id={} message_type={} attempts={} kind={} error={}",
                worker_id,
                delivery_id,
                message_type_label(delivery.body()),
                attempts,
                err.kind(),
                err
            );
            delivery.requeue().await
        }
        Ok(Err(err)) if err.is_duplicate() => {
            warn!(
                "event=delivery_duplicate module=consumer status=acked worker={} delivery_id={} message_type={} error={}",
                worker_id,
                delivery_id,
                message_type_label(delivery.body()),
                err
            );
            delivery.ack().await
        }
        Ok(Err(err)) => {
            error!(
                "event=delivery_rejected module=consumer status=acked worker={} delivery_id={} message_type={} kind={} error={}",
                worker_id,
                delivery_id,
                message_type_label(delivery.body()),
                err.kind(),
                err
            );
            delivery.ack().await
        }
        Err(join_err) => {
            error!(
                "event=delivery_panicked module=consumer status=requeued worker={} delivery_id={} error={}",
                worker_id, delivery_id, join_err
            );
            delivery.requeue().await
        }
    };
    report_settle(worker_id, settled);
}

/// Type tag for log events: the type name, the raw code when it is not a
/// known type, or `unknown` when the envelope itself does not decode.
fn message_type_label(body: &[u8]) -> String {
    match envelope::decode_type(body) {
        Ok(message_type) => message_type.as_str().to_string(),
        Err(EnvelopeError::UnknownMessageType(code)) => code.to_string(),
        Err(_) => "unknown".to_string(),
    }
}

fn report_settle(worker_id: usize, result: Result<(), ConsumerError>) {
    if let Err(err) = result {
        error!(
            "event=delivery_settle module=consumer status=error worker={} error={}",
            worker_id, err
        );
    }
}
