//! The user document: profile fields plus the embedded cart and address book.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::address::Address;
use super::cart::CartLineItem;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub cart: Vec<CartLineItem>,
    pub addresses: Vec<Address>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(uid: impl Into<String>, email: Option<String>, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.into(),
            email,
            display_name,
            cart: Vec::new(),
            addresses: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
