//! Adaptive memory store with temporal weighting
//!
//! Self-updating event memory that prioritizes recent and recurring events:
//! - Near-duplicate writes merge into the existing event (recurrence)
//! - Retrieval blends cosine similarity, exponential recency decay, and a
//!   logarithmic recurrence boost
//! - Durability via a batched write-ahead log plus atomically replaced
//!   snapshots, with crash recovery by log replay
//!
//! The in-memory collection is a linear-scan structure intended for event
//! counts in the thousands, not a production vector index.

pub mod persistence;
pub mod types;
pub mod wal;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::constants::{
    DEFAULT_MAX_AGE_HOURS, PRUNE_TIMEOUT_SECS, RECURRENCE_BOOST_FACTOR, RECURRENCE_WEIGHT,
    REPLAY_TIMEOUT_SECS, RETRIEVE_TIMEOUT_SECS, SIMILARITY_THRESHOLD, SIMILARITY_WEIGHT,
    TEMPORAL_WEIGHT,
};
use crate::errors::{MemoryError, Result};
use crate::similarity::cosine_similarity;
use crate::validation;

use persistence::StorePaths;
pub use types::{EventMetadata, MemoryEvent, MemoryStats, RetrievedEvent};
use wal::WriteBatcher;

/// Shared mutable state behind the in-process lock.
///
/// All mutation and scan operations serialize on this one lock; they are
/// fast CPU-bound critical sections (linear scans), never held across I/O.
struct StoreState {
    events: Mutex<Vec<MemoryEvent>>,
}

/// Self-updating memory store with temporal weighting and decay.
///
/// Writes update the in-memory collection synchronously, then hand a
/// serialized copy to the write-ahead log batcher; durability of an
/// individual write is therefore eventual, bounded by one log batch.
/// `save` drains the log and atomically replaces the snapshot; `load`
/// reconstructs state from the snapshot plus any log records written after
/// it.
pub struct AdaptiveMemoryStore {
    config: StoreConfig,
    paths: StorePaths,
    state: Arc<StoreState>,
    batcher: WriteBatcher,
    /// Result of the construction-time path check. Write's fire-and-forget
    /// log hand-off consults this instead of surfacing `PathTraversal`;
    /// save and load re-validate and do surface it.
    paths_allowed: bool,
}

impl AdaptiveMemoryStore {
    /// Create an empty store.
    ///
    /// Validates configuration bounds; does not touch the filesystem.
    /// Call [`load`](Self::load) to hydrate from disk.
    pub fn new(config: StoreConfig) -> Result<Self> {
        if config.decay_lambda < 0.0 || !config.decay_lambda.is_finite() {
            return Err(MemoryError::invalid_input(
                "decay_lambda",
                "must be non-negative and finite",
            ));
        }
        if config.max_capacity == 0 {
            return Err(MemoryError::invalid_input(
                "max_capacity",
                "must be positive",
            ));
        }
        if config.wal_batch_size == 0 {
            return Err(MemoryError::invalid_input(
                "wal_batch_size",
                "must be positive",
            ));
        }

        let paths = StorePaths::new(&config.storage_dir);
        let paths_allowed =
            validation::validate_store_path(&paths.snapshot, &config.base_dir).is_ok();
        if !paths_allowed {
            warn!(
                storage_dir = ?config.storage_dir,
                base_dir = ?config.base_dir,
                "storage dir resolves outside base dir; persistence operations will be refused"
            );
        }

        let batcher = WriteBatcher::new(paths.wal.clone(), config.wal_batch_size);

        Ok(Self {
            config,
            paths,
            state: Arc::new(StoreState {
                events: Mutex::new(Vec::new()),
            }),
            batcher,
            paths_allowed,
        })
    }

    /// Store an event, merging into an existing near-duplicate if one exists.
    ///
    /// The in-memory mutation is immediately visible to subsequent calls.
    /// The log hand-off is fire-and-forget: its failures are logged and
    /// swallowed, so the event is at risk until the next successful
    /// [`save`](Self::save).
    pub async fn write(
        &self,
        embedding: Vec<f32>,
        metadata: EventMetadata,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        validation::validate_embedding("embedding", &embedding)?;
        let timestamp = timestamp.unwrap_or_else(Utc::now);

        let record = {
            let mut events = self.state.events.lock();

            // Greedy first-match merge: the first event over the threshold
            // absorbs the write, not the most similar one.
            let affected = match events
                .iter_mut()
                .find(|e| cosine_similarity(&embedding, &e.embedding) > SIMILARITY_THRESHOLD)
            {
                Some(existing) => {
                    existing.recurrence_count += 1;
                    existing.metadata.last_seen = Some(timestamp);
                    existing.clone()
                }
                None => {
                    let event = MemoryEvent::new(embedding, metadata, timestamp);
                    events.push(event.clone());
                    event
                }
            };

            // Capacity is advisory: the age-based prune may remove nothing
            // when every event is fresh, leaving the ceiling exceeded.
            if events.len() > self.config.max_capacity {
                let removed = prune_events(&mut events, Utc::now(), DEFAULT_MAX_AGE_HOURS, true);
                debug!(removed, capacity = self.config.max_capacity, "capacity prune");
            }

            affected
        };

        if !self.paths_allowed {
            error!("skipping log append: storage path outside base dir");
            return Ok(());
        }

        match rmp_serde::to_vec_named(&record) {
            Ok(packed) => {
                if let Err(e) = self.batcher.add(packed).await {
                    error!(error = %e, "failed to append event to log");
                }
            }
            Err(e) => error!(error = %e, "failed to serialize event for log"),
        }
        Ok(())
    }

    /// Retrieve the `top_k` events most relevant to `query_embedding`.
    ///
    /// Score per event:
    /// `0.5·cosine + 0.3·exp(-λ·age_hours) + 0.2·(1 + 0.3·ln(1 + recurrences))`.
    /// Results sort descending with ties broken by scan order. Bounded by a
    /// 5 s deadline; on expiry the scan is abandoned and the caller gets a
    /// timeout error with no partial result.
    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedEvent>> {
        validation::validate_embedding("query_embedding", query_embedding)?;
        validation::validate_top_k(top_k)?;

        let state = Arc::clone(&self.state);
        let query = query_embedding.to_vec();
        let decay_lambda = self.config.decay_lambda;

        self.bounded("retrieve", RETRIEVE_TIMEOUT_SECS, move || {
            let events = state.events.lock();
            let now = Utc::now();

            let mut scored: Vec<(OrderedFloat<f32>, RetrievedEvent)> = events
                .iter()
                .map(|event| {
                    let score = score_event(event, &query, decay_lambda, now);
                    (
                        OrderedFloat(score),
                        RetrievedEvent {
                            score,
                            metadata: event.metadata.clone(),
                            timestamp: event.timestamp,
                        },
                    )
                })
                .collect();

            // Stable sort keeps scan order for equal scores.
            scored.sort_by(|a, b| b.0.cmp(&a.0));
            scored
                .into_iter()
                .take(top_k)
                .map(|(_, result)| result)
                .collect()
        })
        .await
    }

    /// Remove events older than `max_age_hours`, returning how many were
    /// dropped.
    ///
    /// `max_age_hours == 0` is a deliberate no-op that preserves the current
    /// set rather than pruning everything. With `keep_critical`, critical
    /// events survive regardless of age. Bounded by a 60 s deadline.
    pub async fn prune(&self, max_age_hours: f64, keep_critical: bool) -> Result<usize> {
        validation::validate_max_age(max_age_hours)?;
        if max_age_hours == 0.0 {
            return Ok(0);
        }

        let state = Arc::clone(&self.state);
        self.bounded("prune", PRUNE_TIMEOUT_SECS, move || {
            let mut events = state.events.lock();
            prune_events(&mut events, Utc::now(), max_age_hours, keep_critical)
        })
        .await
    }

    /// Metadata of events with `start_time <= timestamp <= end_time`,
    /// ascending by timestamp. Bounded by a 30 s deadline.
    pub async fn replay(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<EventMetadata>> {
        if start_time > end_time {
            return Err(MemoryError::invalid_input(
                "start_time",
                "must be before or equal to end_time",
            ));
        }

        let state = Arc::clone(&self.state);
        self.bounded("replay", REPLAY_TIMEOUT_SECS, move || {
            let events = state.events.lock();
            let mut matched: Vec<(DateTime<Utc>, EventMetadata)> = events
                .iter()
                .filter(|e| e.timestamp >= start_time && e.timestamp <= end_time)
                .map(|e| (e.timestamp, e.metadata.clone()))
                .collect();
            matched.sort_by_key(|(ts, _)| *ts);
            matched.into_iter().map(|(_, meta)| meta).collect()
        })
        .await
    }

    /// Drain buffered log records to disk. Errors propagate, unlike the
    /// hand-off inside [`write`](Self::write).
    pub async fn flush(&self) -> Result<()> {
        self.batcher.flush().await
    }

    /// Checkpoint: flush the log, then snapshot the full event set to disk
    /// and retire the log.
    ///
    /// The in-process lock is held only for the in-memory serialization
    /// step; the fsync/rename sequence runs on a blocking thread so it
    /// cannot stall concurrent retrieval or writes. On any failure the
    /// in-memory state is unaffected and no partial snapshot is left behind.
    pub async fn save(&self) -> Result<()> {
        validation::validate_store_path(&self.paths.snapshot, &self.config.base_dir)?;
        self.batcher.flush().await?;

        let state = Arc::clone(&self.state);
        let paths = self.paths.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<usize> {
            let (packed, count) = {
                let events = state.events.lock();
                let packed = rmp_serde::to_vec_named(&*events)
                    .map_err(|e| MemoryError::Serialization(format!("encode snapshot: {e}")))?;
                (packed, events.len())
            };
            persistence::write_snapshot(&packed, &paths)?;
            Ok(count)
        });

        let count = task
            .await
            .map_err(|e| MemoryError::Internal(anyhow!("save worker failed: {e}")))??;
        info!(events = count, path = ?self.paths.snapshot, "memory store saved");
        Ok(())
    }

    /// Hydrate from disk: snapshot plus any log records written after it.
    ///
    /// Returns `Ok(true)` if the snapshot or the log contributed events. A
    /// snapshot that fails to decode is treated as corruption: in-memory
    /// state is cleared and recovery continues from the log alone. If the
    /// current-format snapshot is absent but the legacy single-file format
    /// exists, that is loaded instead and re-persisted on the next save.
    pub async fn load(&self) -> Result<bool> {
        validation::validate_store_path(&self.paths.snapshot, &self.config.base_dir)?;

        let state = Arc::clone(&self.state);
        let paths = self.paths.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<bool> {
            let mut events = state.events.lock();
            let mut loaded = false;

            // One-shot legacy migration, isolated from the main load path.
            if !paths.snapshot.exists() && paths.legacy.exists() {
                match persistence::load_legacy(&paths.legacy) {
                    Ok(list) => {
                        info!(events = list.len(), path = ?paths.legacy, "migrated legacy store");
                        *events = list;
                        return Ok(true);
                    }
                    Err(e) => error!(error = %e, "legacy load failed"),
                }
            }

            if paths.snapshot.exists() {
                match persistence::read_snapshot(&paths) {
                    Ok(list) => {
                        info!(events = list.len(), "loaded events from snapshot");
                        *events = list;
                        loaded = true;
                    }
                    Err(e) => {
                        // Fail-safe over fail-loud: a corrupt snapshot
                        // leaves an empty set for the log to rebuild.
                        error!(error = %e, "snapshot load failed; clearing state and replaying log");
                        events.clear();
                    }
                }
            }

            if paths.wal.exists() {
                match persistence::replay_wal(&paths.wal, &mut events) {
                    Ok(count) if count > 0 => {
                        info!(records = count, "replayed events from log");
                        loaded = true;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "log replay failed"),
                }
            }

            Ok(loaded)
        });

        task.await
            .map_err(|e| MemoryError::Internal(anyhow!("load worker failed: {e}")))?
    }

    /// Health counters over the current event set
    pub fn stats(&self) -> MemoryStats {
        let events = self.state.events.lock();
        if events.is_empty() {
            return MemoryStats::default();
        }

        let now = Utc::now();
        let total_events = events.len();
        let critical_events = events.iter().filter(|e| e.is_critical()).count();
        let avg_age_hours =
            events.iter().map(|e| e.age_hours(now)).sum::<f64>() / total_events as f64;
        let max_recurrence = events.iter().map(|e| e.recurrence_count).max().unwrap_or(0);

        MemoryStats {
            total_events,
            critical_events,
            avg_age_hours,
            max_recurrence,
        }
    }

    /// Number of events currently held
    pub fn len(&self) -> usize {
        self.state.events.lock().len()
    }

    /// Whether the store holds no events
    pub fn is_empty(&self) -> bool {
        self.state.events.lock().is_empty()
    }

    /// Clone of the current event list, in insertion order
    pub fn events(&self) -> Vec<MemoryEvent> {
        self.state.events.lock().clone()
    }

    /// Effective configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run a CPU-bound closure on a blocking thread under a wall-clock
    /// deadline.
    ///
    /// On expiry the task is detached, not cancelled: it finishes on its
    /// own and releases the events lock, so a timed-out operation can never
    /// leave the lock held. The caller sees only the timeout error.
    async fn bounded<T, F>(&self, operation: &str, seconds: f64, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(Duration::from_secs_f64(seconds), task).await {
            Ok(joined) => {
                joined.map_err(|e| MemoryError::Internal(anyhow!("{operation} worker failed: {e}")))
            }
            Err(_) => Err(MemoryError::Timeout {
                operation: operation.to_string(),
                seconds,
            }),
        }
    }
}

/// Compute the blended retrieval score for one event
fn score_event(
    event: &MemoryEvent,
    query: &[f32],
    decay_lambda: f32,
    now: DateTime<Utc>,
) -> f32 {
    let similarity = cosine_similarity(query, &event.embedding);
    let temporal = (-(decay_lambda as f64) * event.age_hours(now)).exp() as f32;
    let recurrence =
        1.0 + RECURRENCE_BOOST_FACTOR * (1.0 + event.recurrence_count as f32).ln();

    SIMILARITY_WEIGHT * similarity + TEMPORAL_WEIGHT * temporal + RECURRENCE_WEIGHT * recurrence
}

/// Drop events older than the cutoff, keeping critical ones if asked.
///
/// Shared by the public prune operation and the capacity check inside
/// write, which both run under the same events lock.
fn prune_events(
    events: &mut Vec<MemoryEvent>,
    now: DateTime<Utc>,
    max_age_hours: f64,
    keep_critical: bool,
) -> usize {
    let cutoff = now - chrono::Duration::milliseconds((max_age_hours * 3_600_000.0) as i64);
    let initial = events.len();

    if keep_critical {
        events.retain(|e| e.is_critical() || e.timestamp > cutoff);
    } else {
        events.retain(|e| e.timestamp > cutoff);
    }

    initial - events.len()
}
