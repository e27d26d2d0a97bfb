use std::collections::HashMap;
use std::sync::RwLock;

use fulfil_catalog::{CatalogReader, Product, ProductId};
use fulfil_core::DomainResult;

/// Product snapshots keyed by id, as published by catalog administration.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product after validating its configuration.
    pub fn upsert(&self, product: Product) -> DomainResult<()> {
        product.validate()?;
        if let Ok(mut map) = self.products.write() {
            map.insert(product.id(), product);
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<Product> {
        match self.products.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }
}

impl CatalogReader for InMemoryCatalog {
    fn product(&self, id: &ProductId) -> Option<Product> {
        let map = self.products.read().ok()?;
        map.get(id).cloned()
    }
}
