//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attribute values. A
/// `Variant` (product, color, size) is the canonical example in this workspace: it is
/// never stored as its own row, only used as a grouping key.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct Variant { product_id: ProductId, color_id: ColorId, size_id: SizeId }
///
/// impl ValueObject for Variant {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
