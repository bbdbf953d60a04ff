//! Durable job queue boundary and an in-process implementation.
//!
//! A [`Delivery`] pairs a job with the [`DeliveryHandle`] that owns it for one
//! attempt. Committing consumes the handle; dropping it uncommitted hands the
//! job back to the queue for redelivery.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, warn};

use super::job::GenerationJob;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue {0} is closed")]
    Closed(String),

    #[error("queue backend error: {0}")]
    Backend(String),
}

/// Consumer side of the queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Wait for the next job. `None` means the queue is closed and drained.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;
}

/// Producer side of the queue.
#[async_trait]
pub trait JobProducer: Send + Sync {
    async fn enqueue(&self, job: GenerationJob) -> Result<(), QueueError>;
}

/// Backend hook behind a [`DeliveryHandle`].
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Mark the message processed.
    async fn commit(self: Box<Self>) -> Result<(), QueueError>;

    /// Give the message back without committing.
    fn release(self: Box<Self>);
}

/// A job plus the handle that must acknowledge it.
#[derive(Debug)]
pub struct Delivery {
    pub job: GenerationJob,
    pub handle: DeliveryHandle,
}

/// Per-attempt ownership of one queued message.
pub struct DeliveryHandle {
    attempt: u32,
    ack: Option<Box<dyn Acknowledge>>,
}

impl DeliveryHandle {
    pub fn new(attempt: u32, ack: Box<dyn Acknowledge>) -> Self {
        Self {
            attempt,
            ack: Some(ack),
        }
    }

    /// 1 on first delivery, incremented on each redelivery.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Acknowledge the message. Consumes the handle, so it happens at most once.
    pub async fn commit(mut self) -> Result<(), QueueError> {
        match self.ack.take() {
            Some(ack) => ack.commit().await,
            None => Ok(()),
        }
    }
}

impl Drop for DeliveryHandle {
    fn drop(&mut self) {
        if let Some(ack) = self.ack.take() {
            ack.release();
        }
    }
}

impl std::fmt::Debug for DeliveryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryHandle")
            .field("attempt", &self.attempt)
            .field("pending", &self.ack.is_some())
            .finish()
    }
}

struct Envelope {
    job: GenerationJob,
    attempt: u32,
}

struct Shared {
    topic: String,
    tx: mpsc::UnboundedSender<Envelope>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    committed: AtomicUsize,
    redelivered: AtomicUsize,
    dead_lettered: AtomicUsize,
    max_attempts: Option<u32>,
    settled: Notify,
}

/// In-process queue with consumer-group semantics.
///
/// Any number of workers may share one `MemoryQueue`; each message is held by
/// at most one of them at a time.
pub struct MemoryQueue {
    shared: Arc<Shared>,
    rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
}

impl MemoryQueue {
    pub fn new(topic: impl Into<String>) -> Self {
        Self::build(topic.into(), None)
    }

    /// Drop a job instead of redelivering it once it has been attempted `max` times.
    pub fn with_max_attempts(topic: impl Into<String>, max: u32) -> Self {
        Self::build(topic.into(), Some(max.max(1)))
    }

    fn build(topic: String, max_attempts: Option<u32>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                topic,
                tx,
                closed: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                committed: AtomicUsize::new(0),
                redelivered: AtomicUsize::new(0),
                dead_lettered: AtomicUsize::new(0),
                max_attempts,
                settled: Notify::new(),
            }),
            rx: Mutex::new(rx),
        }
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    /// Stop accepting jobs. Receivers get `None` once nothing is queued or in flight.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.settled.notify_waiters();
    }

    pub fn committed(&self) -> usize {
        self.shared.committed.load(Ordering::SeqCst)
    }

    pub fn redelivered(&self) -> usize {
        self.shared.redelivered.load(Ordering::SeqCst)
    }

    pub fn dead_lettered(&self) -> usize {
        self.shared.dead_lettered.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    fn deliver(&self, envelope: Envelope) -> Delivery {
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let attempt = envelope.attempt;
        let job = envelope.job.clone();
        debug!(topic = %self.shared.topic, job_id = %job.job_id, attempt, "delivering job");
        Delivery {
            job,
            handle: DeliveryHandle::new(
                attempt,
                Box::new(MemoryAck {
                    shared: self.shared.clone(),
                    envelope: Some(envelope),
                }),
            ),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut rx = self.rx.lock().await;
        loop {
            // Registered before the checks so a release or close in between is not missed.
            let settled = self.shared.settled.notified();

            if let Ok(envelope) = rx.try_recv() {
                return Ok(Some(self.deliver(envelope)));
            }
            if self.shared.closed.load(Ordering::SeqCst)
                && self.shared.in_flight.load(Ordering::SeqCst) == 0
            {
                return Ok(None);
            }

            tokio::select! {
                envelope = rx.recv() => match envelope {
                    Some(envelope) => return Ok(Some(self.deliver(envelope))),
                    None => return Ok(None),
                },
                _ = settled => {}
            }
        }
    }
}

#[async_trait]
impl JobProducer for MemoryQueue {
    async fn enqueue(&self, job: GenerationJob) -> Result<(), QueueError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed(self.shared.topic.clone()));
        }
        self.shared
            .tx
            .send(Envelope { job, attempt: 1 })
            .map_err(|_| QueueError::Closed(self.shared.topic.clone()))
    }
}

struct MemoryAck {
    shared: Arc<Shared>,
    envelope: Option<Envelope>,
}

#[async_trait]
impl Acknowledge for MemoryAck {
    async fn commit(self: Box<Self>) -> Result<(), QueueError> {
        self.shared.committed.fetch_add(1, Ordering::SeqCst);
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.shared.settled.notify_waiters();
        Ok(())
    }

    fn release(mut self: Box<Self>) {
        if let Some(envelope) = self.envelope.take() {
            let exhausted = self
                .shared
                .max_attempts
                .is_some_and(|max| envelope.attempt >= max);
            if exhausted {
                warn!(
                    topic = %self.shared.topic,
                    job_id = %envelope.job.job_id,
                    attempts = envelope.attempt,
                    "job exhausted its attempts; dropping it"
                );
                self.shared.dead_lettered.fetch_add(1, Ordering::SeqCst);
            } else {
                let retry = Envelope {
                    job: envelope.job,
                    attempt: envelope.attempt + 1,
                };
                // Requeue before leaving flight so a closing receiver never sees an empty, idle queue.
                if self.shared.tx.send(retry).is_ok() {
                    self.shared.redelivered.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.shared.settled.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::job::CourseOutline;
    use std::time::Duration;
    use uuid::Uuid;

    fn job() -> GenerationJob {
        GenerationJob::new(Uuid::new_v4(), CourseOutline::default())
    }

    #[tokio::test]
    async fn dropped_handle_redelivers_with_next_attempt() {
        let queue = MemoryQueue::new("generate_new_course");
        let original = job();
        queue.enqueue(original.clone()).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.handle.attempt(), 1);
        drop(first);

        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(second.handle.attempt(), 2);
        assert_eq!(second.job, original);
        assert_eq!(queue.redelivered(), 1);

        second.handle.commit().await.unwrap();
        assert_eq!(queue.committed(), 1);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn committed_job_is_not_redelivered() {
        let queue = MemoryQueue::new("t");
        queue.enqueue(job()).await.unwrap();
        let delivery = queue.receive().await.unwrap().unwrap();
        delivery.handle.commit().await.unwrap();
        queue.close();
        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.redelivered(), 0);
    }

    #[tokio::test]
    async fn consumers_never_share_a_message() {
        let queue = Arc::new(MemoryQueue::new("t"));
        queue.enqueue(job()).await.unwrap();

        let held = queue.receive().await.unwrap().unwrap();
        let other = queue.clone();
        let waiting = tokio::spawn(async move { other.receive().await.unwrap() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        held.handle.commit().await.unwrap();
        queue.close();
        assert!(waiting.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_waits_for_in_flight_release() {
        let queue = Arc::new(MemoryQueue::new("t"));
        queue.enqueue(job()).await.unwrap();
        let held = queue.receive().await.unwrap().unwrap();
        queue.close();

        let other = queue.clone();
        let waiting = tokio::spawn(async move { other.receive().await.unwrap() });
        drop(held);
        let redelivered = waiting.await.unwrap().expect("released job comes back");
        assert_eq!(redelivered.handle.attempt(), 2);
    }

    #[tokio::test]
    async fn exhausted_job_is_dead_lettered() {
        let queue = MemoryQueue::with_max_attempts("t", 2);
        queue.enqueue(job()).await.unwrap();
        drop(queue.receive().await.unwrap().unwrap());
        drop(queue.receive().await.unwrap().unwrap());
        queue.close();

        assert!(queue.receive().await.unwrap().is_none());
        assert_eq!(queue.redelivered(), 1);
        assert_eq!(queue.dead_lettered(), 1);
    }

    #[tokio::test]
    async fn enqueue_after_close_fails() {
        let queue = MemoryQueue::new("t");
        queue.close();
        assert!(matches!(queue.enqueue(job()).await, Err(QueueError::Closed(_))));
    }
}
