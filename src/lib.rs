//! Astra-Memory Library
//!
//! Adaptive memory event store for autonomous agents. Events carry an
//! embedding, open metadata, and a timestamp; retrieval blends cosine
//! similarity, exponential recency decay, and a recurrence boost.
//!
//! # Key Features
//! - Near-duplicate writes merge into one event with a recurrence count
//! - Write-ahead log + atomic snapshots, crash recovery via log replay
//! - Advisory capacity ceiling with age-based eviction
//! - Deadline-bounded retrieval and pruning that cannot poison the lock
//!
//! # Durability Contract
//! `write` acknowledges the in-memory mutation only; the log hand-off is
//! batched and may lose up to one batch on a crash. `save` is the hard
//! checkpoint: it drains the log, fsyncs a snapshot, and atomically
//! replaces the previous one.

pub mod config;
pub mod constants;
pub mod errors;
pub mod memory;
pub mod similarity;
pub mod validation;

// Re-export dependencies to ensure tests/benchmarks use the same version
pub use chrono;
pub use parking_lot;

pub use config::StoreConfig;
pub use errors::{MemoryError, Result};
pub use memory::{
    AdaptiveMemoryStore, EventMetadata, MemoryEvent, MemoryStats, RetrievedEvent,
};
