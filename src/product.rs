//! Products guarded by the `*-product` abilities.

#[cfg(feature = "audit")]
use log::info;

use crate::{
    core::RoleSystem,
    error::{Error, Result},
    storage::Storage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

entity_id! {
    /// Identifier of a product record.
    ProductId
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    #[serde(flatten)]
    details: ProductDraft,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Product {
    pub(crate) fn new(id: ProductId, details: ProductDraft) -> Self {
        let now = Utc::now();
        Self {
            id,
            details,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn details(&self) -> &ProductDraft {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn sku(&self) -> &str {
        &self.details.sku
    }

    pub fn price(&self) -> f64 {
        self.details.price
    }

    pub fn is_active(&self) -> bool {
        self.details.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn replace(&mut self, details: ProductDraft) {
        self.details = details;
        self.updated_at = Utc::now();
    }
}

/// Writable product fields, as accepted by create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub sku: String,
    pub category: String,
    pub is_active: bool,
}

impl ProductDraft {
    /// Check field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("product name is required".into()));
        }
        if self.name.chars().count() > 255 {
            return Err(Error::Validation(
                "product name cannot be longer than 255 characters".into(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(Error::Validation("product description is required".into()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::Validation(format!(
                "product price must be a non-negative number, got {}",
                self.price
            )));
        }
        if self.sku.trim().is_empty() {
            return Err(Error::Validation("product sku is required".into()));
        }
        if self.category.trim().is_empty() {
            return Err(Error::Validation("product category is required".into()));
        }
        Ok(())
    }
}

// Product records carry no permission edges, so writes skip the cache flush.
impl<S> RoleSystem<S>
where
    S: Storage,
{
    pub fn create_product(&self, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;
        let product = self.mutate_records(|tables| {
            let id = tables.next_product_id();
            let product = Product::new(id, draft);
            tables.products.insert(id, product.clone());
            Ok(product)
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!("Product {} ('{}') created", product.id(), product.name());
        }

        Ok(product)
    }

    pub fn find_product(&self, id: ProductId) -> Result<Product> {
        self.read(|tables| tables.product(id).cloned())
    }

    pub fn list_products(&self) -> Result<Vec<Product>> {
        self.read(|tables| Ok(tables.products.values().cloned().collect()))
    }

    /// Replace every writable field of a product.
    pub fn update_product(&self, id: ProductId, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;
        self.mutate_records(|tables| {
            let product = tables.product_mut(id)?;
            product.replace(draft);
            Ok(product.clone())
        })
    }

    pub fn delete_product(&self, id: ProductId) -> Result<()> {
        self.mutate_records(|tables| {
            tables.product(id)?;
            tables.products.remove(&id);
            Ok(())
        })?;

        #[cfg(feature = "audit")]
        if self.audit_enabled() {
            info!("Product {id} deleted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "Desk lamp".into(),
            description: "Adjustable arm".into(),
            price: 39.9,
            sku: "SKU-LAMP01".into(),
            category: "Casa".into(),
            is_active: true,
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn test_invalid_drafts() {
        let mut bad = draft();
        bad.name = " ".into();
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.price = -1.0;
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.price = f64::NAN;
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.sku = String::new();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_product_serializes_flat() {
        let product = Product::new(ProductId(5), draft());
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["sku"], "SKU-LAMP01");
        assert_eq!(value["is_active"], true);
    }

    #[test]
    fn test_product_crud_leaves_cache_alone() {
        let system = RoleSystem::new();
        let generation = system.cache().generation();

        let product = system.create_product(draft()).unwrap();
        assert_eq!(system.list_products().unwrap().len(), 1);

        let mut changed = draft();
        changed.price = 45.0;
        let updated = system.update_product(product.id(), changed).unwrap();
        assert_eq!(updated.price(), 45.0);
        assert_eq!(system.find_product(product.id()).unwrap().price(), 45.0);

        system.delete_product(product.id()).unwrap();
        assert!(system.find_product(product.id()).unwrap_err().is_not_found());
        assert!(system.delete_product(product.id()).unwrap_err().is_not_found());
        assert_eq!(system.cache().generation(), generation);
    }

    #[test]
    fn test_invalid_product_is_not_stored() {
        let system = RoleSystem::new();
        let mut bad = draft();
        bad.description = String::new();
        assert!(system.create_product(bad).is_err());
        assert!(system.list_products().unwrap().is_empty());
    }
}
