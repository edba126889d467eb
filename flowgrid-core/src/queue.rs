//! Multi-producer, single-consumer action queue.
//!
//! Producers (UI callbacks, audio-thread triggers) hold cloned
//! [`ActionProducer`]s and never wait on the applier. The single
//! [`ActionConsumer`] belongs to the dispatcher thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use thiserror::Error;

use flowgrid_types::{Action, ActionMoment};

use crate::config::QueueConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("action queue is shut down")]
    Shutdown,
    #[error("action queue exhausted (capacity {capacity})")]
    Exhausted { capacity: usize },
}

/// Result of a blocking dequeue.
#[derive(Debug)]
pub enum Dequeued {
    Moment(ActionMoment),
    Timeout,
    Shutdown,
}

enum Envelope {
    Moment(ActionMoment),
    /// Nudges a blocked consumer so it notices shutdown.
    Wake,
}

#[derive(Default)]
struct Shared {
    shutdown: AtomicBool,
    gesturing: AtomicBool,
    /// Producers between their shutdown check and the end of their send.
    in_flight: AtomicUsize,
}

/// Keeps a send counted in `in_flight` until it returns.
struct SendGuard<'a>(&'a AtomicUsize);

impl<'a> SendGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        SendGuard(counter)
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ActionQueue;

impl ActionQueue {
    /// Create a connected (producer, consumer) pair.
    pub fn new(config: QueueConfig) -> (ActionProducer, ActionConsumer) {
        let (tx, rx) = if config.capacity == 0 {
            crossbeam_channel::unbounded()
        } else {
            crossbeam_channel::bounded(config.capacity)
        };
        let shared = Arc::new(Shared::default());
        let producer = ActionProducer {
            tx,
            shared: Arc::clone(&shared),
            capacity: config.capacity,
            retries: config.enqueue_retries,
        };
        let consumer = ActionConsumer { rx, shared };
        (producer, consumer)
    }
}

/// Producer half. Clone one per producing thread.
#[derive(Clone)]
pub struct ActionProducer {
    tx: Sender<Envelope>,
    shared: Arc<Shared>,
    capacity: usize,
    retries: u32,
}

impl ActionProducer {
    /// Stamp `action` with the current time and queue it.
    pub fn enqueue(&self, action: impl Into<Action>) -> Result<(), QueueError> {
        self.enqueue_moment(ActionMoment::now(action))
    }

    pub fn enqueue_moment(&self, moment: ActionMoment) -> Result<(), QueueError> {
        // Counted before the flag check: a send that sees the queue open is
        // always waited for by the consumer's final drain.
        let _guard = SendGuard::enter(&self.shared.in_flight);
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(QueueError::Shutdown);
        }
        let kind = moment.action.kind();
        let mut envelope = Envelope::Moment(moment);
        for _ in 0..=self.retries {
            match self.tx.try_send(envelope) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => {
                    envelope = returned;
                    std::thread::yield_now();
                }
                Err(TrySendError::Disconnected(_)) => return Err(QueueError::Shutdown),
            }
        }
        log::warn!(target: "flowgrid::queue", "dropping {} action: queue full after {} retries", kind, self.retries);
        Err(QueueError::Exhausted {
            capacity: self.capacity,
        })
    }

    /// Hold (or release) the current gesture open while a widget is being
    /// dragged. Quiescence never commits while the hold is set.
    pub fn set_gesturing(&self, gesturing: bool) {
        self.shared.gesturing.store(gesturing, Ordering::Release);
    }

    pub fn is_gesturing(&self) -> bool {
        self.shared.gesturing.load(Ordering::Acquire)
    }

    /// Refuse further actions and wake the consumer so it can drain.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _ = self.tx.try_send(Envelope::Wake);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }
}

/// Consumer half, owned by the applier.
pub struct ActionConsumer {
    rx: Receiver<Envelope>,
    shared: Arc<Shared>,
}

impl ActionConsumer {
    pub fn try_dequeue(&self) -> Option<ActionMoment> {
        loop {
            match self.rx.try_recv() {
                Ok(Envelope::Moment(moment)) => return Some(moment),
                Ok(Envelope::Wake) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Block up to `timeout` for the next moment.
    ///
    /// Returns `Shutdown` once the queue is shut down or every producer is
    /// gone; anything still queued is left for [`ActionConsumer::drain`].
    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeued {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_shutdown() {
                return Dequeued::Shutdown;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(Envelope::Moment(moment)) => return Dequeued::Moment(moment),
                Ok(Envelope::Wake) => continue,
                Err(RecvTimeoutError::Timeout) => return Dequeued::Timeout,
                Err(RecvTimeoutError::Disconnected) => return Dequeued::Shutdown,
            }
        }
    }

    /// Everything queued right now, in queue order.
    pub fn drain(&self) -> Vec<ActionMoment> {
        std::iter::from_fn(|| self.try_dequeue()).collect()
    }

    /// Final drain after shutdown: also collects sends that were already
    /// past the shutdown check when the flag flipped.
    pub fn drain_remaining(&self) -> Vec<ActionMoment> {
        let mut moments = Vec::new();
        loop {
            moments.extend(self.drain());
            if self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                moments.extend(self.drain());
                return moments;
            }
            std::thread::yield_now();
        }
    }

    pub fn is_gesturing(&self) -> bool {
        self.shared.gesturing.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgrid_types::{HistoryAction, Path, StoreAction};

    fn set(path: &str, value: f32) -> StoreAction {
        StoreAction::set(Path::parse(path).unwrap(), value)
    }

    #[test]
    fn fifo_per_producer() {
        let (producer, consumer) = ActionQueue::new(QueueConfig::default());
        producer.enqueue(set("/a", 1.0)).unwrap();
        producer.enqueue(HistoryAction::Undo).unwrap();
        let drained = consumer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].action, Action::Store(set("/a", 1.0)));
        assert_eq!(drained[1].action, Action::History(HistoryAction::Undo));
        assert!(consumer.try_dequeue().is_none());
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let (producer, consumer) = ActionQueue::new(QueueConfig::default());
        producer.shutdown();
        assert_eq!(producer.enqueue(set("/a", 1.0)), Err(QueueError::Shutdown));
        assert!(matches!(
            consumer.dequeue_timeout(Duration::from_millis(10)),
            Dequeued::Shutdown
        ));
    }

    #[test]
    fn bounded_queue_exhausts() {
        let config = QueueConfig {
            capacity: 1,
            enqueue_retries: 2,
        };
        let (producer, _consumer) = ActionQueue::new(config);
        producer.enqueue(set("/a", 1.0)).unwrap();
        assert_eq!(
            producer.enqueue(set("/a", 2.0)),
            Err(QueueError::Exhausted { capacity: 1 })
        );
    }

    #[test]
    fn dequeue_times_out_when_idle() {
        let (_producer, consumer) = ActionQueue::new(QueueConfig::default());
        assert!(matches!(
            consumer.dequeue_timeout(Duration::from_millis(5)),
            Dequeued::Timeout
        ));
    }

    #[test]
    fn dropping_all_producers_reads_as_shutdown() {
        let (producer, consumer) = ActionQueue::new(QueueConfig::default());
        drop(producer);
        assert!(matches!(
            consumer.dequeue_timeout(Duration::from_millis(50)),
            Dequeued::Shutdown
        ));
    }

    #[test]
    fn gesturing_flag_is_shared() {
        let (producer, consumer) = ActionQueue::new(QueueConfig::default());
        let other = producer.clone();
        other.set_gesturing(true);
        assert!(consumer.is_gesturing());
        producer.set_gesturing(false);
        assert!(!consumer.is_gesturing());
    }

    #[test]
    fn drain_remaining_waits_for_in_flight_sends() {
        let (producer, consumer) = ActionQueue::new(QueueConfig::default());
        // A send that already passed the shutdown check.
        producer.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        producer.shutdown();

        let late = producer.clone();
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            late.tx
                .try_send(Envelope::Moment(ActionMoment::now(set("/late", 1.0))))
                .unwrap();
            late.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        let drained = consumer.drain_remaining();
        sender.join().unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].action, Action::Store(set("/late", 1.0)));
    }

    #[test]
    fn every_accepted_send_is_drained() {
        let (producer, consumer) = ActionQueue::new(QueueConfig::default());
        let senders: Vec<_> = (0..4)
            .map(|_| {
                let producer = producer.clone();
                std::thread::spawn(move || {
                    let mut accepted = 0usize;
                    while accepted < 20_000 && producer.enqueue(set("/a", 1.0)).is_ok() {
                        accepted += 1;
                    }
                    accepted
                })
            })
            .collect();
        std::thread::sleep(Duration::from_millis(5));
        producer.shutdown();
        let drained = consumer.drain_remaining();
        let accepted: usize = senders.into_iter().map(|t| t.join().unwrap()).sum();
        assert_eq!(drained.len(), accepted);
    }
}
