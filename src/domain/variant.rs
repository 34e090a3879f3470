//! Variant identity and stock records.
//!
//! A variant is one (product, color, size) combination with its own stock
//! count. Its key is derived here and nowhere else; cart lines, inventory
//! rows and order snapshots all have to agree on it byte-for-byte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};

/// Derives the storage key for a (product, color, size) combination.
///
/// The product id is trimmed but kept case-sensitive; color and size are
/// lowercased, and whitespace runs inside the color collapse to `-`. The
/// resulting `{product}_{color}_{size}` string is the variants table primary
/// key, so the derivation is a compatibility contract with stored data.
pub fn derive_variant_key(product_id: &str, color: &str, size: &str) -> Result<String> {
    let product_id = product_id.trim();
    let color = color.trim();
    let size = size.trim();
    if product_id.is_empty() || color.is_empty() || size.is_empty() {
        return Err(Error::validation(
            "product id, color and size are all required to derive a variant key",
        ));
    }
    let color = color.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
    let size = size.to_lowercase();
    Ok(format!("{product_id}_{color}_{size}"))
}

/// One stocked variant, denormalized with its product reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariantRecord {
    pub variant_key: String,
    pub product_id: String,
    pub color: String,
    pub size: String,
    pub stock_level: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input shape for stocking a variant at product-creation time.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct VariantSpec {
    #[validate(length(min = 1))]
    pub color: String,
    #[validate(length(min = 1))]
    pub size: String,
    #[validate(range(min = 0))]
    pub stock_level: i32,
}

impl VariantSpec {
    /// The placeholder variant for products sold without color/size options.
    pub fn default_variant(stock_level: i32) -> Self {
        Self {
            color: "Default".into(),
            size: "One Size".into(),
            stock_level,
        }
    }
}

/// A point-in-time stock answer; `stock_level` is 0 when the variant has
/// never been stocked.
#[derive(Clone, Debug, Serialize)]
pub struct StockView {
    pub variant_key: String,
    pub stock_level: i32,
}
