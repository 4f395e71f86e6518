//! Persistence hooks for entities that embed versioned values.
//!
//! An entity lists its versioned fields through [`VersionedEntity`]; the
//! persistence layer calls [`on_saved`], [`on_deleted`] and [`on_loaded`]
//! at the matching points of the entity's lifecycle.

use tracing::debug;

use crate::error::VersoResult;
use crate::store::StorageContext;
use crate::versioning::VersionedValue;

/// Type-erased lifecycle operations of a versioned value.
pub trait Versioned {
    /// Insert pending versions into `ctx`, then clear them.
    fn flush_pending_history(&mut self, ctx: &dyn StorageContext) -> VersoResult<()>;

    /// Delete durable versions from `ctx` and drop pending ones.
    fn discard_pending_history(&mut self, ctx: &dyn StorageContext) -> VersoResult<()>;

    /// Drop pending versions without touching storage.
    fn clear_pending_history(&mut self);

    /// Treat the baseline write as done.
    fn mark_initial_value_consumed(&mut self);

    /// Number of versions waiting to be flushed.
    fn pending_count(&self) -> usize;
}

impl<T> Versioned for VersionedValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn flush_pending_history(&mut self, ctx: &dyn StorageContext) -> VersoResult<()> {
        VersionedValue::flush_pending_history(self, ctx)
    }

    fn discard_pending_history(&mut self, ctx: &dyn StorageContext) -> VersoResult<()> {
        VersionedValue::discard_pending_history(self, ctx)
    }

    fn clear_pending_history(&mut self) {
        VersionedValue::clear_pending_history(self)
    }

    fn mark_initial_value_consumed(&mut self) {
        VersionedValue::mark_initial_value_consumed(self)
    }

    fn pending_count(&self) -> usize {
        self.pending_versions().len()
    }
}

/// An entity that owns versioned fields.
pub trait VersionedEntity {
    /// The entity's versioned fields, in declaration order.
    fn versioned_fields(&mut self) -> Vec<&mut dyn Versioned>;
}

/// Flush every field's pending versions. Call once per successful save.
///
/// Stops at the first failing field; fields not yet flushed keep their
/// pending versions.
pub fn on_saved<E>(entity: &mut E, ctx: &dyn StorageContext) -> VersoResult<()>
where
    E: VersionedEntity + ?Sized,
{
    let mut flushed = 0;
    for field in entity.versioned_fields() {
        flushed += field.pending_count();
        field.flush_pending_history(ctx)?;
    }
    debug!(context = ctx.context_name(), flushed, "Entity versions saved");
    Ok(())
}

/// Purge every field's durable and pending versions. Call once per delete.
pub fn on_deleted<E>(entity: &mut E, ctx: &dyn StorageContext) -> VersoResult<()>
where
    E: VersionedEntity + ?Sized,
{
    for field in entity.versioned_fields() {
        field.discard_pending_history(ctx)?;
    }
    debug!(context = ctx.context_name(), "Entity versions discarded");
    Ok(())
}

/// Prepare a freshly loaded entity: storage is now the only source of
/// history, and the loaded values are the baseline. Call once per load,
/// before application code writes.
pub fn on_loaded<E>(entity: &mut E)
where
    E: VersionedEntity + ?Sized,
{
    for field in entity.versioned_fields() {
        field.mark_initial_value_consumed();
        field.clear_pending_history();
    }
}
