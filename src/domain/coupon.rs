//! Coupons: percent or flat discounts applied at checkout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discount {
    PercentOff { percent: u32 },
    FlatOff { amount: i64 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount: Discount,
    pub min_order_total: i64,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Discount for a given subtotal, or why the coupon does not apply.
    /// Never exceeds the subtotal: an order total cannot go negative.
    pub fn discount_for(&self, subtotal: i64, now: DateTime<Utc>) -> Result<i64> {
        if !self.active {
            return Err(Error::validation(format!("coupon {} is not active", self.code)));
        }
        if let Some(expires_at) = self.expires_at {
            if now > expires_at {
                return Err(Error::validation(format!("coupon {} has expired", self.code)));
            }
        }
        if subtotal < self.min_order_total {
            return Err(Error::validation(format!(
                "coupon {} requires a minimum order of {}",
                self.code, self.min_order_total
            )));
        }
        let amount = match self.discount {
            Discount::PercentOff { percent } => subtotal * i64::from(percent.min(100)) / 100,
            Discount::FlatOff { amount } => amount,
        };
        Ok(amount.clamp(0, subtotal))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewCoupon {
    #[validate(length(min = 1))]
    pub code: String,
    pub discount: Discount,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub min_order_total: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl NewCoupon {
    pub fn into_coupon(self, now: DateTime<Utc>) -> Result<Coupon> {
        if let Discount::PercentOff { percent } = self.discount {
            if percent == 0 || percent > 100 {
                return Err(Error::validation("percent discount must be within 1..=100"));
            }
        }
        if let Discount::FlatOff { amount } = self.discount {
            if amount <= 0 {
                return Err(Error::validation("flat discount must be positive"));
            }
        }
        Ok(Coupon {
            code: self.code.trim().to_uppercase(),
            discount: self.discount,
            min_order_total: self.min_order_total,
            active: self.active,
            expires_at: self.expires_at,
            created_at: now,
            updated_at: now,
        })
    }
}
