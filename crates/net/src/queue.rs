use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// An inbound datagram as captured on the socket runtime's thread. The
/// sender endpoint is kept textual here and only parsed at the poll
/// boundary, on the game thread.
#[derive(Debug, Clone)]
pub struct DatagramEvent {
    pub sender_host: String,
    pub sender_port: u16,
    pub payload: Vec<u8>,
    /// Milliseconds since the epoch; zero is an invariant violation.
    pub timestamp_ms: u64,
}

/// One record in the inbound event queue.
#[derive(Debug, Clone)]
pub enum QueuedEvent {
    Datagram(DatagramEvent),
    /// Forward-compat catch-all for event kinds this layer does not
    /// understand. Reaching the poll boundary with one is a bridging bug.
    Unhandled { kind: u32 },
}

/// Wall-clock milliseconds, pinned to at least 1 so a stamped event can
/// never trip the zero-timestamp invariant.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        .max(1)
}

/// Unbounded FIFO between the socket runtime's tasks and the game loop.
///
/// Producers post from arbitrary runtime threads; the single consumer
/// polls once per tick. Neither side blocks beyond the mutex. There is no
/// backpressure: the queue is drained every tick, so growth is bounded by
/// one tick's worth of traffic under normal load.
#[derive(Clone, Default)]
pub struct MessageQueue {
    inner: Arc<Mutex<VecDeque<QueuedEvent>>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedEvent>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record. Returns false (dropping the record) if it
    /// violates the timestamp invariant; that is asserted in debug builds.
    pub fn post(&self, event: QueuedEvent) -> bool {
        if let QueuedEvent::Datagram(dgram) = &event {
            debug_assert!(dgram.timestamp_ms != 0, "datagram event with zero timestamp");
            if dgram.timestamp_ms == 0 {
                return false;
            }
        }
        self.lock().push_back(event);
        true
    }

    /// Removes and returns the oldest record, if any. Never blocks.
    pub fn pop(&self) -> Option<QueuedEvent> {
        self.lock().pop_front()
    }

    /// Pops and discards everything queued, returning how many records
    /// were thrown away. Dropping a record releases its payload.
    pub fn drain(&self) -> usize {
        let mut queue = self.lock();
        let count = queue.len();
        queue.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
