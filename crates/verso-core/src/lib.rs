//! verso-core - Core library for verso.
//!
//! This crate provides [`VersionedValue`], a field wrapper that keeps every
//! value it replaced, together with the version stores and persistence hooks
//! that move that history into durable storage.
//!
//! # Example
//!
//! ```ignore
//! use verso_core::{CollectionRegistry, SqliteVersionCollection, SqliteVersionStore,
//!                  VersionCollection, VersionedValue};
//!
//! struct Library {
//!     titles: SqliteVersionCollection<String>,
//! }
//!
//! fn titles(ctx: &Library) -> &dyn VersionCollection<String> {
//!     &ctx.titles
//! }
//!
//! let store = SqliteVersionStore::new("versions.db")?;
//! let library = Library { titles: store.collection("book_title")? };
//! CollectionRegistry::global().register::<Library, String>(titles);
//!
//! let mut title = VersionedValue::<String>::new();
//! title.set("Draft".to_string());
//! title.set("Final".to_string());
//! title.flush_pending_history(&library)?;
//!
//! let history = title.versions(&library)?; // ["Draft"]
//! ```

pub mod config;
pub mod entity;
pub mod environment;
pub mod error;
pub mod store;
pub mod versioning;

// Re-export commonly used types
pub use config::{IdStrategy, StoreBackend, VersioningConfig};
pub use entity::{on_deleted, on_loaded, on_saved, Versioned, VersionedEntity};
pub use environment::{
    Clock, Environment, IdGenerator, ManualClock, SystemClock, UuidV4, UuidV7,
};
pub use error::{ErrorCode, VersoError, VersoResult};
pub use store::{
    CollectionRegistry, InMemoryVersionCollection, ProvidesVersions, SqliteVersionCollection,
    SqliteVersionStore, StorageContext, VersionCollection, VersionStoreFactory,
};
pub use versioning::{Version, VersionedValue};
