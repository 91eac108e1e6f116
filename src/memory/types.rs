//! Type definitions for the memory store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::DEFAULT_SEVERITY;

fn default_severity() -> f32 {
    DEFAULT_SEVERITY
}

fn default_recurrence() -> u32 {
    1
}

/// Metadata attached to an event.
///
/// The keys the engine itself reads are typed fields; everything else a
/// caller supplies rides in `extra` as opaque JSON values and round-trips
/// through the wire format untouched (within MessagePack's type system —
/// e.g. sets arrive back as sequences).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Base importance of the event, 0.0 to 1.0
    #[serde(default = "default_severity")]
    pub severity: f32,

    /// Critical events are exempt from age-based pruning when the caller
    /// asks for critical retention
    #[serde(default)]
    pub critical: bool,

    /// Stamped on the existing event whenever a near-duplicate write
    /// merges into it
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,

    /// Caller-defined fields, passed through without interpretation
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            severity: DEFAULT_SEVERITY,
            critical: false,
            last_seen: None,
            extra: HashMap::new(),
        }
    }
}

impl EventMetadata {
    /// Metadata with a given severity and no extra fields
    pub fn with_severity(severity: f32) -> Self {
        Self {
            severity,
            ..Self::default()
        }
    }

    /// Metadata flagged critical
    pub fn critical() -> Self {
        Self {
            critical: true,
            ..Self::default()
        }
    }

    /// Attach a caller-defined field
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// One stored embedding + metadata + timestamp record.
///
/// Immutable by convention: only the write path mutates an event in place
/// (recurrence merge), and only prune removes one. The serialized form is
/// the wire format for both the snapshot and the write-ahead log; the
/// timestamp travels as an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEvent {
    /// Embedding vector; non-empty, dimensionality not enforced globally
    pub embedding: Vec<f32>,

    /// Reserved keys plus the open side-channel
    pub metadata: EventMetadata,

    /// When the event was recorded (caller-assigned or write-time "now")
    pub timestamp: DateTime<Utc>,

    /// How many near-duplicate writes merged into this event; always >= 1
    #[serde(default = "default_recurrence")]
    pub recurrence_count: u32,
}

impl MemoryEvent {
    /// Create a fresh event with a recurrence count of 1
    pub fn new(embedding: Vec<f32>, metadata: EventMetadata, timestamp: DateTime<Utc>) -> Self {
        Self {
            embedding,
            metadata,
            timestamp,
            recurrence_count: 1,
        }
    }

    /// Age of the event in hours relative to `now`
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.timestamp).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Whether the event is exempt from age pruning under critical retention
    pub fn is_critical(&self) -> bool {
        self.metadata.critical
    }

    /// Base importance, taken from the severity metadata field
    pub fn base_importance(&self) -> f32 {
        self.metadata.severity
    }
}

/// One retrieval result: the blended score plus the event's metadata and
/// timestamp. Embeddings are not echoed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedEvent {
    /// Blended similarity/recency/recurrence score
    pub score: f32,

    /// The matched event's metadata
    pub metadata: EventMetadata,

    /// The matched event's timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health counters over the current in-memory event set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Events currently held in memory
    pub total_events: usize,

    /// Events flagged critical
    pub critical_events: usize,

    /// Mean event age in hours (0.0 for an empty store)
    pub avg_age_hours: f64,

    /// Highest recurrence count observed (0 for an empty store)
    pub max_recurrence: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_defaults() {
        let meta = EventMetadata::default();
        assert_eq!(meta.severity, DEFAULT_SEVERITY);
        assert!(!meta.critical);
        assert!(meta.last_seen.is_none());
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn test_event_accessors() {
        let meta = EventMetadata::critical();
        let event = MemoryEvent::new(vec![1.0, 0.0], meta, Utc::now());
        assert!(event.is_critical());
        assert_eq!(event.base_importance(), DEFAULT_SEVERITY);
        assert_eq!(event.recurrence_count, 1);
    }

    #[test]
    fn test_age_hours() {
        let now = Utc::now();
        let event = MemoryEvent::new(
            vec![1.0],
            EventMetadata::default(),
            now - chrono::Duration::hours(3),
        );
        assert!((event.age_hours(now) - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_wire_roundtrip_preserves_fields() {
        let meta = EventMetadata::with_severity(0.9)
            .with_extra("source", json!("sensor-7"))
            .with_extra("readings", json!([1, 2, 3]));
        let mut event = MemoryEvent::new(vec![0.25, -0.5, 0.75], meta, Utc::now());
        event.recurrence_count = 4;

        let bytes = rmp_serde::to_vec_named(&event).expect("encode");
        let decoded: MemoryEvent = rmp_serde::from_slice(&bytes).expect("decode");

        assert_eq!(decoded, event);
    }

    #[test]
    fn test_wire_decode_defaults_recurrence() {
        // Records written before recurrence tracking have no count field;
        // decoding must default it to 1.
        #[derive(Serialize)]
        struct Bare<'a> {
            embedding: &'a [f32],
            metadata: EventMetadata,
            timestamp: DateTime<Utc>,
        }
        let bytes = rmp_serde::to_vec_named(&Bare {
            embedding: &[1.0, 2.0],
            metadata: EventMetadata::default(),
            timestamp: Utc::now(),
        })
        .expect("encode");

        let decoded: MemoryEvent = rmp_serde::from_slice(&bytes).expect("decode");
        assert_eq!(decoded.recurrence_count, 1);
    }
}
