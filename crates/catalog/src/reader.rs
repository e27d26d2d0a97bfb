use std::sync::Arc;

use crate::product::{Product, ProductId};

/// Catalog snapshot reader.
///
/// Returns an owned snapshot of a product as currently published, including
/// soft-deleted and unpublished entries (callers decide availability).
pub trait CatalogReader: Send + Sync {
    fn product(&self, id: &ProductId) -> Option<Product>;
}

impl<S> CatalogReader for Arc<S>
where
    S: CatalogReader + ?Sized,
{
    fn product(&self, id: &ProductId) -> Option<Product> {
        (**self).product(id)
    }
}
