//! Bounded hand-off queue between log producers and the shipping worker.
//!
//! Producers call [`ShippingQueue::enqueue`], which never waits for space:
//! when the queue is full the incoming message is dropped and counted. The
//! single consumer waits with a finite timeout in [`ShippingQueue::dequeue`]
//! and may put a message that failed to send back at the head with
//! [`ShippingQueue::requeue_front`].
//!
//! Enqueueing from interrupt or exception context is not supported. The
//! interceptor never calls into the queue from such a context.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::log_message::LogMessage;

/// Default number of messages held by the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Reasons a message could not be enqueued.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity; the message was dropped.
    #[error("shipping queue is full")]
    QueueFull,
    /// The queue has been closed by shutdown.
    #[error("shipping queue is closed")]
    Closed,
    /// The pipeline has not been started yet.
    #[error("log shipping has not been started")]
    NotStarted,
}

/// Outcome of a consumer wait.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue {
    Message(LogMessage),
    /// The wait expired without a message.
    Idle,
    /// The queue was closed and holds nothing more.
    Closed,
}

struct QueueState {
    items: VecDeque<LogMessage>,
    closed: bool,
}

/// Fixed-capacity FIFO of rendered log lines.
pub struct ShippingQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    drained: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl ShippingQueue {
    /// Create a queue holding at most `capacity` messages.
    ///
    /// Storage for every slot is reserved up front so producers never
    /// allocate while holding the lock.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Append `msg` without waiting for space.
    ///
    /// When the queue is full the message is dropped (drop-newest) and
    /// [`EnqueueError::QueueFull`] is returned. Callers must not retry.
    pub fn enqueue(&self, msg: LogMessage) -> Result<(), EnqueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(EnqueueError::Closed);
        }
        if state.items.len() >= self.capacity {
            drop(state);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(EnqueueError::QueueFull);
        }
        state.items.push_back(msg);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Put a message that failed to send back at the head of the queue.
    ///
    /// If the queue filled up in the meantime the returned message is the
    /// one dropped; resident entries are never evicted. Returns whether the
    /// message was kept.
    pub fn requeue_front(&self, msg: LogMessage) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.items.len() >= self.capacity {
            drop(state);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.items.push_front(msg);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// A timeout too large to express as a deadline waits without limit.
    ///
    /// Messages still queued at close time are handed out before
    /// [`Dequeue::Closed`] is reported.
    pub fn dequeue(&self, timeout: Duration) -> Dequeue {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if let Some(msg) = state.items.pop_front() {
                if state.items.is_empty() {
                    self.drained.notify_all();
                }
                return Dequeue::Message(msg);
            }
            if state.closed {
                return Dequeue::Closed;
            }
            if timed_out {
                return Dequeue::Idle;
            }
            match deadline {
                Some(deadline) => {
                    timed_out = self.available.wait_until(&mut state, deadline).timed_out();
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Block until the queue is empty or `timeout` elapses.
    ///
    /// An empty queue only means every message has been handed to the
    /// worker; the last one may still be in flight.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while !state.items.is_empty() {
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut state, deadline).timed_out() {
                        return state.items.is_empty();
                    }
                }
                None => self.drained.wait(&mut state),
            }
        }
        true
    }

    /// Reject further producers and wake the consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
        self.drained.notify_all();
    }
}

impl std::fmt::Debug for ShippingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}
