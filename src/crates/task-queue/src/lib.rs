//! Distributed task queue, worker loop, and coordinator (§4.3, §6.2, §6.4):
//! at-least-once delivery, crash-safe attempt tracking, and the
//! submit/cancel control plane that front it.

pub mod attempts;
pub mod backend;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod policy;
pub mod redis;
pub mod worker;

pub use attempts::{AttemptStore, InMemoryAttemptStore};
pub use backend::{QueueBackend, QueueStats};
pub use coordinator::{Coordinator, ShutdownSignal, SubmitRequest};
pub use error::{QueueError, Result};
pub use memory::InMemoryQueue;
pub use policy::RuntimePolicy;
pub use redis::RedisQueue;
pub use worker::{ProcessFailure, ProcessOutput, Processor, Worker};
