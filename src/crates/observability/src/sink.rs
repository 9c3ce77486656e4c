//! The non-blocking producer side of §4.5: `emit` never blocks and never
//! propagates backpressure to the caller. Events are buffered in a
//! lock-guarded ring and drained by a single background task into a
//! downstream [`EventSink`] (typically an [`crate::store::EventStore`], but
//! a tracer or any other sink works too).
//!
//! **Overflow policy: drop-oldest.** When the buffer is full, the oldest
//! buffered event is evicted to make room for the new one and the dropped
//! counter is incremented. This favors a producer's most recent activity
//! over its history, the right tradeoff for a live dashboard: a stale burst
//! of old events is less useful than knowing what's happening now.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use runtime_types::{Event, EventSink};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Default buffer depth per §4.5 ("bounded queue (configurable, default
/// 256)").
pub const DEFAULT_CAPACITY: usize = 256;

struct Shared {
    buffer: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

/// A bounded, drop-oldest, single-consumer event buffer in front of a
/// downstream sink.
pub struct AsyncSink {
    shared: Arc<Shared>,
    drain: JoinHandle<()>,
}

impl AsyncSink {
    pub fn new(downstream: Arc<dyn EventSink>, capacity: usize) -> Self {
        let shared = Arc::new(Shared {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        });

        let drain_shared = shared.clone();
        let drain = tokio::spawn(async move {
            loop {
                let batch: Vec<Event> = {
                    let mut buffer = drain_shared.buffer.lock();
                    buffer.drain(..).collect()
                };
                if batch.is_empty() {
                    drain_shared.notify.notified().await;
                    continue;
                }
                for event in batch {
                    downstream.emit(event.normalize(Utc::now())).await;
                }
            }
        });

        Self { shared, drain }
    }

    pub fn with_default_capacity(downstream: Arc<dyn EventSink>) -> Self {
        Self::new(downstream, DEFAULT_CAPACITY)
    }

    /// Number of events evicted by the drop-oldest policy since construction.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Current buffered depth, mostly useful for tests.
    pub fn buffered_count(&self) -> usize {
        self.shared.buffer.lock().len()
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        self.drain.abort();
    }
}

#[async_trait]
impl EventSink for AsyncSink {
    async fn emit(&self, event: Event) {
        let mut buffer = self.shared.buffer.lock();
        if buffer.len() >= self.shared.capacity {
            buffer.pop_front();
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(event);
        drop(buffer);
        self.shared.notify.notify_one();
    }
}
