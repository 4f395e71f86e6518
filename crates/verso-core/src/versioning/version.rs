//! Historical snapshot of a tracked value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A value that was once current, stamped with the time it became current.
///
/// Versions are immutable once created. Ordering across a value's history
/// is by `recorded_at`, newest first when read back from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version<T> {
    owner_id: Uuid,
    recorded_at: DateTime<Utc>,
    value: T,
}

impl<T> Version<T> {
    /// Create a version owned by the versioned value with identity `owner_id`.
    pub fn new(owner_id: Uuid, recorded_at: DateTime<Utc>, value: T) -> Self {
        Self {
            owner_id,
            recorded_at,
            value,
        }
    }

    /// Identity of the owning versioned value.
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// When this value became current.
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// The historical value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the version, returning its value.
    pub fn into_value(self) -> T {
        self.value
    }
}
