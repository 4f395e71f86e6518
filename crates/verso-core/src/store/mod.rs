//! Durable version storage.
//!
//! A storage context (the application's "database handle") exposes one
//! [`VersionCollection`] per tracked type. The [`CollectionRegistry`] maps a
//! context type to the accessor for each collection it holds.

mod memory;
mod registry;
mod sqlite;

use std::any::{type_name, Any};

use tracing::info;
use uuid::Uuid;

use crate::config::{StoreBackend, VersioningConfig};
use crate::error::VersoResult;
use crate::versioning::Version;

pub use memory::InMemoryVersionCollection;
pub use registry::{CollectionRegistry, ProvidesVersions};
pub use sqlite::{SqliteVersionCollection, SqliteVersionStore};

/// Storage for the versions of one tracked type.
pub trait VersionCollection<T> {
    /// Insert versions, preserving their order.
    fn insert_many(&self, versions: &[Version<T>]) -> VersoResult<()>;

    /// Delete every version owned by `owner_id`. Returns the number removed.
    fn delete_owner(&self, owner_id: Uuid) -> VersoResult<usize>;

    /// All versions owned by `owner_id`, newest `recorded_at` first.
    fn query_owner(&self, owner_id: Uuid) -> VersoResult<Vec<Version<T>>>;
}

/// Handle passed to flush/discard/history operations.
///
/// Implemented for every `'static` type; the registry decides whether a
/// given context type actually exposes the collection that is asked for.
/// Pass the context itself, or the `Arc`/`Box` it lives in; other wrappers
/// (`Rc`, `&C` behind another reference) are distinct types and must be
/// dereferenced first.
pub trait StorageContext: Any {
    /// Upcast for downcasting to the concrete context type.
    fn as_any(&self) -> &(dyn Any + 'static);

    /// Type name used in configuration errors.
    fn context_name(&self) -> &'static str;
}

impl<C: Any> StorageContext for C {
    fn as_any(&self) -> &(dyn Any + 'static) {
        self
    }

    fn context_name(&self) -> &'static str {
        type_name::<C>()
    }
}

/// Factory for version stores.
pub struct VersionStoreFactory;

impl VersionStoreFactory {
    /// Open the SQLite store described by `config`.
    ///
    /// The memory backend opens a private in-memory database.
    pub fn open(config: &VersioningConfig) -> VersoResult<SqliteVersionStore> {
        let store = match config.store.backend {
            StoreBackend::Memory => SqliteVersionStore::in_memory()?,
            StoreBackend::Sqlite => SqliteVersionStore::new(&config.store.path)?,
        };
        info!(
            backend = ?config.store.backend,
            table_prefix = %config.store.table_prefix,
            "Opened version store"
        );
        Ok(store.with_table_prefix(config.store.table_prefix.clone()))
    }
}
