//! Registry of version collection accessors, keyed by context type.
//!
//! Each entry binds a (context type, tracked type) pair to a function that
//! borrows the right collection out of the context. Entries are registered
//! once at startup and shared process-wide. A context registered as `C` is
//! also found when passed as `Arc<C>` or `Box<C>`.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use super::{StorageContext, VersionCollection};
use crate::error::{VersoError, VersoResult};

/// Implemented by contexts that hold a collection for `T`.
///
/// Register with [`CollectionRegistry::register_provider`].
pub trait ProvidesVersions<T> {
    /// The collection holding versions of `T`.
    fn version_collection(&self) -> &dyn VersionCollection<T>;
}

trait Accessor<T>: Send + Sync {
    fn get<'a>(&self, ctx: &'a (dyn Any + 'static)) -> Option<&'a dyn VersionCollection<T>>;
}

struct Binding<C, T> {
    accessor: fn(&C) -> &dyn VersionCollection<T>,
}

impl<C: Any, T: 'static> Accessor<T> for Binding<C, T> {
    fn get<'a>(&self, ctx: &'a (dyn Any + 'static)) -> Option<&'a dyn VersionCollection<T>> {
        let context = ctx
            .downcast_ref::<C>()
            .or_else(|| ctx.downcast_ref::<Arc<C>>().map(|c| &**c))
            .or_else(|| ctx.downcast_ref::<Box<C>>().map(|c| &**c))?;
        Some((self.accessor)(context))
    }
}

type Key = (TypeId, TypeId);

/// Maps (context type, tracked type) to a collection accessor.
#[derive(Default)]
pub struct CollectionRegistry {
    bindings: RwLock<HashMap<Key, Box<dyn Any + Send + Sync>>>,
}

static GLOBAL: Lazy<CollectionRegistry> = Lazy::new(CollectionRegistry::new);

fn capability_name<T>() -> String {
    format!("VersionCollection<{}>", type_name::<T>())
}

impl CollectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by versioned values.
    pub fn global() -> &'static CollectionRegistry {
        &GLOBAL
    }

    /// Bind `accessor` as the collection for `T` on contexts of type `C`,
    /// `Arc<C>` and `Box<C>`.
    ///
    /// Registering the same pair again replaces the accessor.
    pub fn register<C: Any, T: 'static>(&self, accessor: fn(&C) -> &dyn VersionCollection<T>) {
        let binding: Arc<dyn Accessor<T>> = Arc::new(Binding { accessor });
        let tracked = TypeId::of::<T>();
        // Entries are inserted whole, so a poisoned map is still consistent.
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        for context in [
            TypeId::of::<C>(),
            TypeId::of::<Arc<C>>(),
            TypeId::of::<Box<C>>(),
        ] {
            bindings.insert((context, tracked), Box::new(Arc::clone(&binding)));
        }
        debug!(
            context = type_name::<C>(),
            tracked = type_name::<T>(),
            "Registered version collection"
        );
    }

    /// Register a context that implements [`ProvidesVersions<T>`].
    pub fn register_provider<C, T>(&self)
    where
        C: ProvidesVersions<T> + Any,
        T: 'static,
    {
        self.register::<C, T>(<C as ProvidesVersions<T>>::version_collection);
    }

    /// Whether contexts of type `C` expose a collection for `T`.
    pub fn contains<C: Any, T: 'static>(&self) -> bool {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(TypeId::of::<C>(), TypeId::of::<T>()))
    }

    /// Borrow the collection for `T` out of `ctx`.
    ///
    /// Fails with a configuration error if the context's type was never
    /// registered for `T`.
    pub fn resolve<'a, T: 'static>(
        &self,
        ctx: &'a dyn StorageContext,
    ) -> VersoResult<&'a dyn VersionCollection<T>> {
        let any = ctx.as_any();
        let accessor = {
            let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
            bindings
                .get(&(any.type_id(), TypeId::of::<T>()))
                .and_then(|b| b.downcast_ref::<Arc<dyn Accessor<T>>>())
                .cloned()
        };

        match accessor.and_then(|a| a.get(any)) {
            Some(collection) => Ok(collection),
            None => {
                let capability = capability_name::<T>();
                warn!(
                    context = ctx.context_name(),
                    capability = %capability,
                    "Storage context does not expose the required version collection"
                );
                Err(VersoError::missing_collection(ctx.context_name(), capability))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::store::InMemoryVersionCollection;
    use crate::versioning::Version;
    use chrono::Utc;
    use uuid::Uuid;

    struct Catalog {
        titles: InMemoryVersionCollection<String>,
        ratings: InMemoryVersionCollection<u8>,
    }

    impl ProvidesVersions<u8> for Catalog {
        fn version_collection(&self) -> &dyn VersionCollection<u8> {
            &self.ratings
        }
    }

    fn catalog_titles(ctx: &Catalog) -> &dyn VersionCollection<String> {
        &ctx.titles
    }

    fn catalog() -> Catalog {
        Catalog {
            titles: InMemoryVersionCollection::new(),
            ratings: InMemoryVersionCollection::new(),
        }
    }

    #[test]
    fn test_resolve_registered_accessor() {
        let registry = CollectionRegistry::new();
        registry.register::<Catalog, String>(catalog_titles);
        assert!(registry.contains::<Catalog, String>());

        let ctx = catalog();
        let owner = Uuid::new_v4();
        registry
            .resolve::<String>(&ctx)
            .unwrap()
            .insert_many(&[Version::new(owner, Utc::now(), "old".to_string())])
            .unwrap();

        assert_eq!(ctx.titles.len(), 1);
        assert!(ctx.ratings.is_empty());
    }

    #[test]
    fn test_register_provider() {
        let registry = CollectionRegistry::new();
        registry.register_provider::<Catalog, u8>();

        let ctx = catalog();
        let ratings = registry.resolve::<u8>(&ctx).unwrap();
        assert!(ratings.query_owner(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_tracked_type_is_configuration_error() {
        let registry = CollectionRegistry::new();
        registry.register::<Catalog, String>(catalog_titles);

        let ctx = catalog();
        let err = registry.resolve::<i64>(&ctx).err().unwrap();
        assert_eq!(err.code(), ErrorCode::CfgMissingCollection);
        assert_eq!(err.capability(), Some("VersionCollection<i64>"));
        assert!(err.to_string().contains("Catalog"));
    }

    #[test]
    fn test_resolve_through_shared_handles() {
        let registry = CollectionRegistry::new();
        registry.register::<Catalog, String>(catalog_titles);
        assert!(registry.contains::<Arc<Catalog>, String>());
        assert!(registry.contains::<Box<Catalog>, String>());

        let shared = Arc::new(catalog());
        let owner = Uuid::new_v4();
        registry
            .resolve::<String>(&shared)
            .unwrap()
            .insert_many(&[Version::new(owner, Utc::now(), "shared".to_string())])
            .unwrap();
        assert_eq!(shared.titles.len(), 1);

        let boxed = Box::new(catalog());
        assert!(registry.resolve::<String>(&boxed).is_ok());
        assert!(registry.resolve::<u8>(&shared).is_err());
    }

    #[test]
    fn test_poisoned_registry_still_registers_and_resolves() {
        let registry = Arc::new(CollectionRegistry::new());
        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.bindings.write().unwrap();
            panic!("writer panicked while holding the registry lock");
        })
        .join();
        assert!(registry.bindings.is_poisoned());

        registry.register::<Catalog, String>(catalog_titles);
        assert!(registry.contains::<Catalog, String>());
        assert!(registry.resolve::<String>(&catalog()).is_ok());
    }

    #[test]
    fn test_missing_context_type_is_configuration_error() {
        struct Unrelated;

        let registry = CollectionRegistry::new();
        registry.register::<Catalog, String>(catalog_titles);

        let err = registry.resolve::<String>(&Unrelated).err().unwrap();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Unrelated"));
    }
}
