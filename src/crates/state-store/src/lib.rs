//! Hybrid durable+cache state store for runs and checkpoints (§4.2).
//!
//! [`hybrid::HybridStore`] is the production composition: a durable backend
//! that is always the source of truth, fronted by an optional best-effort
//! cache. Two durable backends are provided — [`sqlite::SqliteStore`] for
//! real deployments and [`memory::InMemoryStore`] for tests and
//! single-process use without a live database — a dual-implementation
//! shape mirrored across every backend-having crate in this workspace.

pub mod config;
pub mod error;
pub mod hybrid;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use config::HybridStoreConfig;
pub use error::{Result, StoreError};
pub use hybrid::HybridStore;
pub use traits::{CacheBackend, DurableBackend, RunFilter, StateStore, StoreStats};
