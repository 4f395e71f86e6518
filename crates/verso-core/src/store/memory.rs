//! In-process version collection.

use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::VersionCollection;
use crate::error::{VersoError, VersoResult};
use crate::versioning::Version;

/// Version collection backed by a vector, for tests and callers without
/// durable storage.
#[derive(Debug)]
pub struct InMemoryVersionCollection<T> {
    versions: Mutex<Vec<Version<T>>>,
}

impl<T> Default for InMemoryVersionCollection<T> {
    fn default() -> Self {
        Self {
            versions: Mutex::new(Vec::new()),
        }
    }
}

impl<T> InMemoryVersionCollection<T> {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> VersoResult<MutexGuard<'_, Vec<Version<T>>>> {
        self.versions
            .lock()
            .map_err(|_| VersoError::internal("version collection lock poisoned"))
    }

    /// Number of stored versions across all owners.
    pub fn len(&self) -> usize {
        self.lock().map(|v| v.len()).unwrap_or(0)
    }

    /// Whether the collection holds no versions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> VersionCollection<T> for InMemoryVersionCollection<T> {
    fn insert_many(&self, versions: &[Version<T>]) -> VersoResult<()> {
        self.lock()?.extend_from_slice(versions);
        Ok(())
    }

    fn delete_owner(&self, owner_id: Uuid) -> VersoResult<usize> {
        let mut stored = self.lock()?;
        let before = stored.len();
        stored.retain(|v| v.owner_id() != owner_id);
        Ok(before - stored.len())
    }

    fn query_owner(&self, owner_id: Uuid) -> VersoResult<Vec<Version<T>>> {
        // Reverse insertion order first so equal timestamps stay newest-first
        // through the stable sort.
        let mut found: Vec<Version<T>> = self
            .lock()?
            .iter()
            .rev()
            .filter(|v| v.owner_id() == owner_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.recorded_at().cmp(&a.recorded_at()));
        Ok(found)
    }
}
