//! Records addressed by a stable id across status changes.

/// A job or task record.
pub trait Entity {
    /// Strongly-typed record identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
