//! Query access shared by the storefront views.

/// A folded view that the admin and health endpoints can size up.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Entries currently held: orders, customers with history, or stocked products.
    fn count(&self) -> usize;
}
