//! Value versioning for audit trails and point-in-time queries
//!
//! A [`VersionedValue`] wraps one field of an entity and keeps each value it
//! replaced as an immutable [`Version`], so "what was this field last week?"
//! can be answered from the version store.

mod value;
mod version;

pub use value::VersionedValue;
pub use version::Version;
