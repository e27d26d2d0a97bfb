//! Catalog domain module.
//!
//! Read-side model of products and their variants as published by catalog
//! administration, plus the pricing rules that turn a base price and a discount
//! configuration into the price charged at a given instant. Pure domain logic
//! (no IO, no storage).

pub mod discount;
pub mod pricing;
pub mod product;
pub mod reader;

pub use discount::{Discount, DiscountSchedule, TimeOfDay};
pub use pricing::{price_breakdown, resolve_price, PriceBreakdown};
pub use product::{PricingTerms, Product, ProductId, Variant};
pub use reader::CatalogReader;
