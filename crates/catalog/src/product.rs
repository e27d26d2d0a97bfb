use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use fulfil_core::{AggregateId, DomainError, DomainResult};

use crate::discount::{Discount, DiscountSchedule};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A specific sellable configuration of a product (color/size/unit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub sku: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub unit: Option<String>,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub discount: Discount,
    pub schedule: Option<DiscountSchedule>,
}

impl Variant {
    pub fn new(sku: impl Into<String>, price: u64) -> Self {
        Self {
            sku: sku.into(),
            color: None,
            size: None,
            unit: None,
            price,
            discount: Discount::NoDiscount,
            schedule: None,
        }
    }

    pub fn with_discount(mut self, discount: Discount, schedule: DiscountSchedule) -> Self {
        self.discount = discount;
        self.schedule = Some(schedule);
        self
    }

    pub fn with_labels(
        mut self,
        color: Option<&str>,
        size: Option<&str>,
        unit: Option<&str>,
    ) -> Self {
        self.color = color.map(str::to_string);
        self.size = size.map(str::to_string);
        self.unit = unit.map(str::to_string);
        self
    }

    /// Human-readable suffix for order lines, e.g. `"Red / M"`.
    pub fn label(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.color, &self.size, &self.unit]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" / "))
        }
    }
}

/// The price inputs that apply to one product/variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingTerms<'a> {
    pub base_price: u64,
    pub discount: &'a Discount,
    pub schedule: Option<&'a DiscountSchedule>,
}

/// Catalog entry as published by catalog administration.
///
/// Stock levels are not part of this snapshot; they are owned by the
/// inventory ledger and keyed by the same `ProductId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    image: Option<String>,
    /// Price in smallest currency unit (e.g., cents).
    base_price: u64,
    discount: Discount,
    schedule: Option<DiscountSchedule>,
    variants: Vec<Variant>,
    published: bool,
    deleted: bool,
}

impl Product {
    /// A published product without variants or discount.
    pub fn new(id: ProductId, name: impl Into<String>, base_price: u64) -> Self {
        Self {
            id,
            name: name.into(),
            image: None,
            base_price,
            discount: Discount::NoDiscount,
            schedule: None,
            variants: Vec::new(),
            published: true,
            deleted: false,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_discount(mut self, discount: Discount, schedule: DiscountSchedule) -> Self {
        self.discount = discount;
        self.schedule = Some(schedule);
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn unpublished(mut self) -> Self {
        self.published = false;
        self
    }

    pub fn soft_deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn base_price(&self) -> u64 {
        self.base_price
    }

    pub fn discount(&self) -> &Discount {
        &self.discount
    }

    pub fn schedule(&self) -> Option<&DiscountSchedule> {
        self.schedule.as_ref()
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn variant(&self, sku: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.sku == sku)
    }

    /// Check that the product can be ordered at all.
    pub fn ensure_sellable(&self) -> DomainResult<()> {
        if self.deleted {
            return Err(DomainError::unavailable(self.id, "product has been deleted"));
        }
        if !self.published {
            return Err(DomainError::unavailable(self.id, "product is not published"));
        }
        Ok(())
    }

    /// Price inputs for a selection.
    ///
    /// With a variant, the variant price is the base. The variant's own
    /// discount wins when it declares one; otherwise the product-level
    /// configuration applies. The two are never combined.
    pub fn pricing_for(&self, variant_sku: Option<&str>) -> DomainResult<PricingTerms<'_>> {
        let Some(sku) = variant_sku else {
            return Ok(PricingTerms {
                base_price: self.base_price,
                discount: &self.discount,
                schedule: self.schedule.as_ref(),
            });
        };

        let variant = self
            .variant(sku)
            .ok_or_else(|| DomainError::not_found("variant", format!("{}/{sku}", self.id)))?;

        if variant.discount.is_none() {
            Ok(PricingTerms {
                base_price: variant.price,
                discount: &self.discount,
                schedule: self.schedule.as_ref(),
            })
        } else {
            Ok(PricingTerms {
                base_price: variant.price,
                discount: &variant.discount,
                schedule: variant.schedule.as_ref(),
            })
        }
    }

    /// Structural problems with a catalog entry, all of them.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.name.trim().is_empty() {
            violations.push("name cannot be empty".to_string());
        }
        if let Discount::Percent(p) = self.discount {
            if p > 100 {
                violations.push(format!("discount percent must be at most 100, got {p}"));
            }
        }
        if let Some(s) = &self.schedule {
            violations.extend(s.violations("schedule"));
        }

        let mut seen = HashSet::new();
        for (idx, v) in self.variants.iter().enumerate() {
            if v.sku.trim().is_empty() {
                violations.push(format!("variants[{idx}].sku cannot be empty"));
            } else if !seen.insert(v.sku.as_str()) {
                violations.push(format!("variants[{idx}].sku {} is duplicated", v.sku));
            }
            if let Discount::Percent(p) = v.discount {
                if p > 100 {
                    violations.push(format!(
                        "variants[{idx}].discount percent must be at most 100, got {p}"
                    ));
                }
            }
            if let Some(s) = &v.schedule {
                violations.extend(s.violations(&format!("variants[{idx}].schedule")));
            }
        }
        violations
    }

    pub fn validate(&self) -> DomainResult<()> {
        DomainError::check_violations(self.violations())
    }
}
