//! Traits: the plain-data components attached to subjects.
//!
//! Any `'static + Default + Send + Sync` type becomes a trait by deriving [`Trait`]:
//!
//! ```ignore
//! #[derive(Trait, Default, Clone, Copy)]
//! struct Located(Vec3);
//! ```
//!
//! Traits are stored type-erased in chunk columns, so the registry keeps a descriptor per type with
//! its layout, a drop function and a default constructor. `Default` is required because slots are
//! always kept initialized: appended and recycled rows start from `Default::default()`.

mod erased;
mod set;

pub use erased::ErasedTrait;
pub use set::{TraitSet, TraitTarget};

/// A plain-data component.
pub trait Trait: 'static + Default + Send + Sync {}
