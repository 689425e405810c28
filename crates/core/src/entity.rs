//! Entity trait: identity that survives quantity changes.

/// Entity marker + minimal interface.
///
/// Stock records and movement entries are entities: two records holding the same
/// quantity of the same variant are still different holders.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
