//! The versioned value wrapper.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::environment::Environment;
use crate::error::VersoResult;
use crate::store::{CollectionRegistry, StorageContext};
use crate::versioning::Version;

/// A single tracked value that keeps every value it replaced.
///
/// The first write after construction establishes the baseline and is
/// never recorded. Every later write of a *different* value appends a
/// [`Version`] holding the replaced value, stamped with the time that value
/// became current. Writing an equal value is a no-op.
///
/// Pending versions live here until the owning entity is saved
/// ([`flush_pending_history`](Self::flush_pending_history)) or deleted
/// ([`discard_pending_history`](Self::discard_pending_history)).
///
/// Not internally synchronized: writers must be serialized by the owner.
#[derive(Debug, Clone)]
pub struct VersionedValue<T> {
    identity: Option<Uuid>,
    last_modified: DateTime<Utc>,
    value: T,
    pending: Vec<Version<T>>,
    is_initial_value: bool,
    env: Arc<Environment>,
}

impl<T> VersionedValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a value holding `T::default()`.
    pub fn new() -> Self
    where
        T: Default,
    {
        Self::with_default(T::default())
    }

    /// Create a value holding an explicit default.
    pub fn with_default(value: T) -> Self {
        Self::with_environment(value, Environment::global())
    }

    /// Create a value using a specific clock and id generator.
    pub fn with_environment(value: T, env: Arc<Environment>) -> Self {
        Self {
            identity: None,
            last_modified: env.now(),
            value,
            pending: Vec::new(),
            is_initial_value: true,
            env,
        }
    }

    /// Rebuild a value materialized from storage.
    ///
    /// The initial write is treated as already consumed, so the next
    /// change records `value` as a version.
    pub fn restore(identity: Option<Uuid>, last_modified: DateTime<Utc>, value: T) -> Self {
        Self::restore_with_environment(identity, last_modified, value, Environment::global())
    }

    /// [`restore`](Self::restore) with a specific environment.
    pub fn restore_with_environment(
        identity: Option<Uuid>,
        last_modified: DateTime<Utc>,
        value: T,
        env: Arc<Environment>,
    ) -> Self {
        Self {
            identity,
            last_modified,
            value,
            pending: Vec::new(),
            is_initial_value: false,
            env,
        }
    }

    /// Identity shared by this value's versions. `None` until the first change.
    pub fn identity(&self) -> Option<Uuid> {
        self.identity
    }

    /// Time of the most recent write.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// The current value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Whether the baseline write is still outstanding.
    pub fn is_initial_value(&self) -> bool {
        self.is_initial_value
    }

    /// Write a new value.
    ///
    /// Returns `true` if the write recorded a version.
    pub fn set(&mut self, new_value: T) -> bool {
        if self.is_initial_value {
            self.is_initial_value = false;
            self.last_modified = self.env.now();
            self.value = new_value;
            return false;
        }
        if self.value == new_value {
            return false;
        }

        let owner_id = match self.identity {
            Some(id) => id,
            None => {
                let id = self.env.next_id();
                debug!(identity = %id, "Assigned identity to versioned value");
                self.identity = Some(id);
                id
            }
        };
        // The replaced value was current since the previous write.
        let since = self.last_modified;
        let previous = std::mem::replace(&mut self.value, new_value);
        self.pending.push(Version::new(owner_id, since, previous));
        self.last_modified = self.env.now();
        trace!(identity = %owner_id, pending = self.pending.len(), "Recorded version");
        true
    }

    /// Versions recorded since the last flush, oldest first.
    pub fn pending_versions(&self) -> &[Version<T>] {
        &self.pending
    }

    /// Durable history of this value, newest first.
    ///
    /// A value that has never changed has no history; the result is empty.
    pub fn versions(&self, ctx: &dyn StorageContext) -> VersoResult<Vec<Version<T>>> {
        let collection = CollectionRegistry::global().resolve::<T>(ctx)?;
        match self.identity {
            Some(id) => collection.query_owner(id),
            None => Ok(Vec::new()),
        }
    }

    /// The value that was current at `at`, looking through pending and
    /// durable history. `None` if `at` predates everything recorded.
    pub fn value_at(&self, ctx: &dyn StorageContext, at: DateTime<Utc>) -> VersoResult<Option<T>> {
        if at >= self.last_modified {
            return Ok(Some(self.value.clone()));
        }
        if let Some(version) = self.pending.iter().rev().find(|v| v.recorded_at() <= at) {
            return Ok(Some(version.value().clone()));
        }
        Ok(self
            .versions(ctx)?
            .into_iter()
            .find(|v| v.recorded_at() <= at)
            .map(Version::into_value))
    }

    /// Insert pending versions into the context's collection, then clear them.
    ///
    /// On failure the pending versions are kept, so retrying resends all of them.
    pub fn flush_pending_history(&mut self, ctx: &dyn StorageContext) -> VersoResult<()> {
        let collection = CollectionRegistry::global().resolve::<T>(ctx)?;
        if self.pending.is_empty() {
            return Ok(());
        }
        collection.insert_many(&self.pending)?;
        debug!(
            identity = ?self.identity,
            count = self.pending.len(),
            "Flushed pending versions"
        );
        self.pending.clear();
        Ok(())
    }

    /// Delete this value's durable versions and drop pending ones.
    pub fn discard_pending_history(&mut self, ctx: &dyn StorageContext) -> VersoResult<()> {
        let collection = CollectionRegistry::global().resolve::<T>(ctx)?;
        if let Some(id) = self.identity {
            let deleted = collection.delete_owner(id)?;
            debug!(identity = %id, deleted, pending = self.pending.len(), "Discarded versions");
        }
        self.pending.clear();
        Ok(())
    }

    /// Drop pending versions without touching storage.
    pub fn clear_pending_history(&mut self) {
        self.pending.clear();
    }

    /// Treat the baseline write as done, without writing.
    pub fn mark_initial_value_consumed(&mut self) {
        self.is_initial_value = false;
    }
}

impl<T> Default for VersionedValue<T>
where
    T: Default + Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Display> fmt::Display for VersionedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{ManualClock, UuidV4};
    use chrono::Duration;

    fn manual_env() -> (Arc<ManualClock>, Arc<Environment>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let env = Arc::new(Environment::new(clock.clone(), Arc::new(UuidV4)));
        (clock, env)
    }

    #[test]
    fn test_first_write_never_records() {
        let mut title = VersionedValue::<String>::new();
        assert!(title.is_initial_value());

        assert!(!title.set("Dune".to_string()));
        assert!(title.pending_versions().is_empty());
        assert!(title.identity().is_none());
        assert!(!title.is_initial_value());
        assert_eq!(title.value(), "Dune");
    }

    #[test]
    fn test_first_write_of_default_is_absorbed() {
        let mut count = VersionedValue::<i32>::new();
        assert!(!count.set(0));
        assert!(count.pending_versions().is_empty());

        assert!(count.set(1));
        assert_eq!(count.pending_versions().len(), 1);
        assert_eq!(*count.pending_versions()[0].value(), 0);
    }

    #[test]
    fn test_unchanged_write_is_noop() {
        let (clock, env) = manual_env();
        let mut title = VersionedValue::with_environment(String::new(), env);
        title.set("a".to_string());
        title.set("b".to_string());

        let identity = title.identity();
        let modified = title.last_modified();
        let pending = title.pending_versions().to_vec();

        clock.advance(Duration::seconds(10));
        assert!(!title.set("b".to_string()));

        assert_eq!(title.identity(), identity);
        assert_eq!(title.last_modified(), modified);
        assert_eq!(title.pending_versions(), pending.as_slice());
        assert_eq!(title.value(), "b");
    }

    #[test]
    fn test_unchanged_write_before_identity_is_noop() {
        let mut title = VersionedValue::<String>::new();
        title.set("a".to_string());
        let modified = title.last_modified();

        assert!(!title.set("a".to_string()));
        assert!(title.identity().is_none());
        assert_eq!(title.last_modified(), modified);
    }

    #[test]
    fn test_identity_assigned_once() {
        let mut title = VersionedValue::<String>::new();
        title.set("a".to_string());
        assert!(title.identity().is_none());

        title.set("b".to_string());
        let identity = title.identity().expect("identity after first change");

        title.set("c".to_string());
        title.set("d".to_string());
        assert_eq!(title.identity(), Some(identity));
        assert!(title
            .pending_versions()
            .iter()
            .all(|v| v.owner_id() == identity));
    }

    #[test]
    fn test_versions_capture_replaced_value_and_old_timestamp() {
        let (clock, env) = manual_env();
        let mut title = VersionedValue::with_environment(String::new(), env);

        title.set("a".to_string());
        let a_since = title.last_modified();

        clock.advance(Duration::seconds(1));
        title.set("b".to_string());
        let b_since = title.last_modified();

        clock.advance(Duration::seconds(1));
        title.set("c".to_string());

        let pending = title.pending_versions();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].value(), "a");
        assert_eq!(pending[0].recorded_at(), a_since);
        assert_eq!(pending[1].value(), "b");
        assert_eq!(pending[1].recorded_at(), b_since);
        assert!(a_since < b_since);
    }

    #[test]
    fn test_mark_initial_value_consumed() {
        let mut title = VersionedValue::with_default("loaded".to_string());
        title.mark_initial_value_consumed();

        assert!(title.set("edited".to_string()));
        assert_eq!(title.pending_versions().len(), 1);
        assert_eq!(title.pending_versions()[0].value(), "loaded");
    }

    #[test]
    fn test_restore_keeps_identity() {
        let id = Uuid::new_v4();
        let loaded_at = Utc::now() - Duration::days(1);
        let mut title = VersionedValue::restore(Some(id), loaded_at, "loaded".to_string());

        assert!(!title.is_initial_value());
        title.set("edited".to_string());
        let pending = title.pending_versions();
        assert_eq!(pending[0].owner_id(), id);
        assert_eq!(pending[0].recorded_at(), loaded_at);
    }

    #[test]
    fn test_clear_pending_history() {
        let mut title = VersionedValue::<String>::new();
        title.set("a".to_string());
        title.set("b".to_string());
        title.clear_pending_history();
        assert!(title.pending_versions().is_empty());
        assert!(title.identity().is_some());
    }

    #[test]
    fn test_display_forwards_to_value() {
        let mut count = VersionedValue::<u32>::new();
        count.set(7);
        assert_eq!(count.to_string(), "7");
    }
}
