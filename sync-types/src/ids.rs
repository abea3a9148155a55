//! Identity and ordering types for casesync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::SyncError;

/// Milliseconds in one day.
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Identifier of a synchronized record.
///
/// Opaque to the sync engine and unique within one [`EntityType`].
/// Immutable once assigned.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an existing identifier.
    ///
    /// Returns an error if the identifier is empty or only whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, SyncError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SyncError::InvalidData("record id must not be empty".into()));
        }
        Ok(Self(id))
    }

    /// Generate a fresh, time-sortable identifier (UUID v7).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl FromStr for RecordId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The kinds of records that take part in synchronization.
///
/// Each entity type is replicated independently and maps to one remote
/// collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A child's case record.
    CaseRecord,
    /// A program event.
    Event,
    /// An attendance mark for an event.
    Attendance,
    /// An assessment question.
    AssessmentQuestion,
    /// An answer to an assessment question.
    AssessmentAnswer,
}

impl EntityType {
    /// Every entity type, in coordinated-run order.
    pub const ALL: [EntityType; 5] = [
        EntityType::CaseRecord,
        EntityType::Event,
        EntityType::Attendance,
        EntityType::AssessmentQuestion,
        EntityType::AssessmentAnswer,
    ];

    /// Stable collection name used by both stores.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::CaseRecord => "case_records",
            EntityType::Event => "events",
            EntityType::Attendance => "attendance",
            EntityType::AssessmentQuestion => "assessment_questions",
            EntityType::AssessmentAnswer => "assessment_answers",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for EntityType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|entity| entity.collection() == s)
            .ok_or_else(|| SyncError::UnknownEntityType(s.to_string()))
    }
}

/// A wall-clock instant in Unix milliseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from Unix milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Read the system clock.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(millis)
    }

    /// Unix milliseconds.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// The instant `days` days earlier.
    pub fn minus_days(&self, days: u32) -> Self {
        Self(self.0.saturating_sub(i64::from(days).saturating_mul(DAY_MS)))
    }

    /// The instant `millis` milliseconds later.
    pub fn plus_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Resume point of a paginated pull.
///
/// Remote records are ordered by `(updated_at, id)`. A push batch stamps
/// every record with the same `updated_at`, so the id breaks ties and a
/// page may end inside such a group without skipping records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PullCursor {
    /// `updated_at` of the last record seen.
    pub updated_at: Timestamp,
    /// Id of the last record seen.
    pub id: RecordId,
}

impl PullCursor {
    /// Create a cursor positioned at the given record.
    pub fn new(updated_at: Timestamp, id: RecordId) -> Self {
        Self { updated_at, id }
    }

    /// Whether a record with this key sorts strictly after the cursor.
    pub fn is_before(&self, updated_at: Timestamp, id: &RecordId) -> bool {
        (self.updated_at, &self.id) < (updated_at, id)
    }
}
