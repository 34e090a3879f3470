//! Product catalog types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::variant::{VariantRecord, VariantSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Prices are integer minor units (paise).
    pub base_price: i64,
    pub sale_price: Option<i64>,
    pub discount_label: Option<String>,
    pub colors: Vec<ColorOption>,
    pub sizes: Vec<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColorOption {
    pub name: String,
    pub hex: Option<String>,
}

impl Product {
    /// Sale price when one is set, base price otherwise. Cart lines and order
    /// snapshots always price through here so a sale applies everywhere at
    /// once.
    pub fn effective_price(&self) -> i64 {
        self.sale_price.unwrap_or(self.base_price)
    }
}

/// Product view with live per-variant stock joined in.
#[derive(Clone, Debug, Serialize)]
pub struct ProductWithInventory {
    #[serde(flatten)]
    pub product: Product,
    pub inventory: Vec<VariantRecord>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub category: String,
    #[validate(range(min = 0))]
    pub base_price: i64,
    pub sale_price: Option<i64>,
    pub discount_label: Option<String>,
    #[serde(default)]
    pub colors: Vec<ColorOption>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Initial stock, one entry per color×size combination. Empty means the
    /// product is stocked as a single default variant.
    #[serde(default)]
    #[validate]
    pub variants: Vec<VariantSpec>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProductPatch {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub category: Option<String>,
    #[validate(range(min = 0))]
    pub base_price: Option<i64>,
    pub sale_price: Option<i64>,
    pub discount_label: Option<String>,
    pub colors: Option<Vec<ColorOption>>,
    pub sizes: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
}

impl ProductPatch {
    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(base_price) = self.base_price {
            product.base_price = base_price;
        }
        if self.sale_price.is_some() {
            product.sale_price = self.sale_price;
        }
        if self.discount_label.is_some() {
            product.discount_label = self.discount_label;
        }
        if let Some(colors) = self.colors {
            product.colors = colors;
        }
        if let Some(sizes) = self.sizes {
            product.sizes = sizes;
        }
        if let Some(images) = self.images {
            product.images = images;
        }
        product.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product {
            id: "P1".into(),
            name: "Linen Shirt".into(),
            category: "shirts".into(),
            base_price: 99900,
            sale_price: None,
            discount_label: None,
            colors: vec![],
            sizes: vec![],
            images: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn effective_price_prefers_sale() {
        let mut p = product();
        assert_eq!(p.effective_price(), 99900);
        p.sale_price = Some(79900);
        assert_eq!(p.effective_price(), 79900);
    }

    #[test]
    fn patch_applies_only_given_fields() {
        let mut p = product();
        let patch = ProductPatch {
            sale_price: Some(79900),
            ..Default::default()
        };
        patch.apply(&mut p);
        assert_eq!(p.sale_price, Some(79900));
        assert_eq!(p.name, "Linen Shirt");
    }
}
