//! Documented constants for the memory store
//!
//! This module contains all tunable parameters with justification for their
//! values. Centralizing constants prevents magic numbers and makes tuning
//! easier.

// =============================================================================
// RETRIEVAL SCORING WEIGHTS
// The retrieval score blends three signals; weights sum to 1.0
// =============================================================================

/// Weight for cosine similarity in the blended retrieval score
///
/// Justification:
/// - 0.5 (50%) keeps semantic match the primary signal
/// - Similarity answers "is this the same kind of event?"
pub const SIMILARITY_WEIGHT: f32 = 0.5;

/// Weight for the temporal decay term in the blended retrieval score
///
/// Justification:
/// - 0.3 (30%) lets recency reorder near-equal semantic matches
/// - Decays exponentially: `exp(-decay_lambda * age_hours)`
pub const TEMPORAL_WEIGHT: f32 = 0.3;

/// Weight for the recurrence boost in the blended retrieval score
///
/// Justification:
/// - 0.2 (20%) rewards events observed repeatedly without letting a
///   high-recurrence stale event dominate a fresh exact match
pub const RECURRENCE_WEIGHT: f32 = 0.2;

/// Logarithmic growth factor for the recurrence boost
///
/// The boost is `1 + RECURRENCE_BOOST_FACTOR * ln(1 + recurrence_count)`,
/// so each additional recurrence adds a diminishing amount.
pub const RECURRENCE_BOOST_FACTOR: f32 = 0.3;

/// Epsilon added to the cosine denominator to avoid division by zero
pub const SIMILARITY_EPSILON: f32 = 1e-10;

// =============================================================================
// WRITE PATH
// =============================================================================

/// Cosine similarity above which a write merges into an existing event
///
/// Justification:
/// - 0.85 is high enough that only near-duplicates merge
/// - The scan is greedy first-match, not best-match: the first event over
///   the threshold absorbs the write
pub const SIMILARITY_THRESHOLD: f32 = 0.85;

/// Default exponential decay rate (per hour) for temporal weighting
pub const DEFAULT_DECAY_LAMBDA: f32 = 0.1;

/// Default soft ceiling on stored event count
///
/// Capacity is advisory: exceeding it triggers the default age-based prune,
/// which removes nothing when every event is younger than the default max
/// age. Callers needing a hard bound must prune explicitly.
pub const DEFAULT_MAX_CAPACITY: usize = 10_000;

/// Max age (hours) used by the capacity-triggered prune
pub const DEFAULT_MAX_AGE_HOURS: f64 = 24.0;

/// Default number of results returned by retrieval
pub const DEFAULT_TOP_K: usize = 5;

// =============================================================================
// DURABILITY
// =============================================================================

/// Records buffered before the write-ahead log flushes automatically
///
/// Justification:
/// - 100 amortizes the append syscall across a burst of writes
/// - Bounded-durability trade-off: up to one batch is lost on crash
///   between flushes; `save()` drains the buffer for a hard checkpoint
pub const DEFAULT_WAL_BATCH_SIZE: usize = 100;

/// Snapshot file name under the configured storage directory
pub const SNAPSHOT_FILENAME: &str = "memory_store.msgpack";

/// Extension appended to the snapshot path for the write-ahead log
pub const WAL_SUFFIX: &str = "wal";

/// Extension appended to the snapshot path for the inter-process lock sidecar
pub const LOCK_SUFFIX: &str = "lock";

/// Legacy single-file snapshot name, read once during migration
pub const LEGACY_FILENAME: &str = "memory_store.json";

// =============================================================================
// OPERATION DEADLINES
// Bounded operations are abandoned (not retried) on expiry
// =============================================================================

/// Wall-clock deadline for `retrieve` (seconds)
pub const RETRIEVE_TIMEOUT_SECS: f64 = 5.0;

/// Wall-clock deadline for `prune` (seconds)
pub const PRUNE_TIMEOUT_SECS: f64 = 60.0;

/// Wall-clock deadline for time-range `replay` (seconds)
pub const REPLAY_TIMEOUT_SECS: f64 = 30.0;

// =============================================================================
// METADATA DEFAULTS
// =============================================================================

/// Base importance assigned when a caller supplies no severity
pub const DEFAULT_SEVERITY: f32 = 0.5;
