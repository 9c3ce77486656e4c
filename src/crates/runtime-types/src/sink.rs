//! The narrow seam every component emits observability events through
//! (§4.5). Kept here, alongside `Event` itself, so the graph executor,
//! queue/worker, and evaluation runner can all depend on the contract
//! without depending on `observability`'s async buffering internals.

use async_trait::async_trait;

use crate::event::Event;

/// Something that accepts events. `observability::AsyncSink` is the
/// production implementation (bounded buffer, drop-oldest under
/// backpressure); [`NoopSink`] is used wherever a caller hasn't wired one up.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// Discards every event. The default when a component is run standalone
/// without an observability sink configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn emit(&self, _event: Event) {}
}
