//! Read-only collaborators the inventory service consults: the warehouse directory,
//! the product catalog and the clock.
//!
//! Their storage belongs to other parts of the system; in-memory implementations are
//! provided for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ColorId, DomainError, DomainResult, ProductId, SizeId, WarehouseId};
use stockledger_inventory::Variant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: Option<String>,
}

pub trait WarehouseDirectory: Send + Sync {
    fn get(&self, id: WarehouseId) -> Option<Warehouse>;

    fn exists(&self, id: WarehouseId) -> bool {
        self.get(id).is_some()
    }
}

impl<W> WarehouseDirectory for Arc<W>
where
    W: WarehouseDirectory + ?Sized,
{
    fn get(&self, id: WarehouseId) -> Option<Warehouse> {
        (**self).get(id)
    }
}

/// Human-readable labels of a variant, used to compose lot serials.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariantLabels {
    pub product_code: Option<String>,
    pub brand: Option<String>,
    pub color_name: Option<String>,
    pub size_label: Option<String>,
}

pub trait ProductCatalog: Send + Sync {
    fn product_exists(&self, id: ProductId) -> bool;

    /// Checks that product, color and size exist and that the color belongs to the
    /// product and the size to the color.
    fn validate_relationship(&self, variant: &Variant) -> DomainResult<()>;

    fn labels(&self, variant: &Variant) -> Option<VariantLabels>;
}

impl<P> ProductCatalog for Arc<P>
where
    P: ProductCatalog + ?Sized,
{
    fn product_exists(&self, id: ProductId) -> bool {
        (**self).product_exists(id)
    }

    fn validate_relationship(&self, variant: &Variant) -> DomainResult<()> {
        (**self).validate_relationship(variant)
    }

    fn labels(&self, variant: &Variant) -> Option<VariantLabels> {
        (**self).labels(variant)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.write() {
            *now += by;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.write() {
            *now = at;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// In-memory warehouse directory.
#[derive(Debug, Default)]
pub struct InMemoryWarehouses {
    warehouses: RwLock<HashMap<WarehouseId, Warehouse>>,
}

impl InMemoryWarehouses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: WarehouseId, name: impl Into<String>) {
        if let Ok(mut warehouses) = self.warehouses.write() {
            warehouses.insert(
                id,
                Warehouse {
                    id,
                    name: name.into(),
                    location: None,
                },
            );
        }
    }

    pub fn with(self, id: i64, name: impl Into<String>) -> Self {
        self.insert(WarehouseId::new(id), name);
        self
    }
}

impl WarehouseDirectory for InMemoryWarehouses {
    fn get(&self, id: WarehouseId) -> Option<Warehouse> {
        self.warehouses.read().ok()?.get(&id).cloned()
    }
}

#[derive(Debug, Clone)]
struct CatalogProduct {
    code: Option<String>,
    brand: Option<String>,
}

#[derive(Debug, Clone)]
struct CatalogColor {
    product_id: ProductId,
    name: String,
}

#[derive(Debug, Clone)]
struct CatalogSize {
    color_id: ColorId,
    label: String,
}

/// In-memory product catalog (product, its colors and each color's sizes).
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: HashMap<ProductId, CatalogProduct>,
    colors: HashMap<ColorId, CatalogColor>,
    sizes: HashMap<SizeId, CatalogSize>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, id: i64, code: Option<&str>, brand: Option<&str>) -> Self {
        self.products.insert(
            ProductId::new(id),
            CatalogProduct {
                code: code.map(str::to_string),
                brand: brand.map(str::to_string),
            },
        );
        self
    }

    pub fn with_color(mut self, id: i64, product_id: i64, name: &str) -> Self {
        self.colors.insert(
            ColorId::new(id),
            CatalogColor {
                product_id: ProductId::new(product_id),
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_size(mut self, id: i64, color_id: i64, label: &str) -> Self {
        self.sizes.insert(
            SizeId::new(id),
            CatalogSize {
                color_id: ColorId::new(color_id),
                label: label.to_string(),
            },
        );
        self
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn product_exists(&self, id: ProductId) -> bool {
        self.products.contains_key(&id)
    }

    fn validate_relationship(&self, variant: &Variant) -> DomainResult<()> {
        if !self.products.contains_key(&variant.product_id) {
            return Err(DomainError::not_found("product", variant.product_id));
        }
        let color = self
            .colors
            .get(&variant.color_id)
            .ok_or_else(|| DomainError::not_found("color", variant.color_id))?;
        let size = self
            .sizes
            .get(&variant.size_id)
            .ok_or_else(|| DomainError::not_found("size", variant.size_id))?;
        if color.product_id != variant.product_id {
            return Err(DomainError::validation(format!(
                "color {} does not belong to product {}",
                variant.color_id, variant.product_id
            )));
        }
        if size.color_id != variant.color_id {
            return Err(DomainError::validation(format!(
                "size {} does not belong to color {}",
                variant.size_id, variant.color_id
            )));
        }
        Ok(())
    }

    fn labels(&self, variant: &Variant) -> Option<VariantLabels> {
        let product = self.products.get(&variant.product_id)?;
        Some(VariantLabels {
            product_code: product.code.clone(),
            brand: product.brand.clone(),
            color_name: self.colors.get(&variant.color_id).map(|c| c.name.clone()),
            size_label: self.sizes.get(&variant.size_id).map(|s| s.label.clone()),
        })
    }
}
