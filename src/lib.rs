//! Loomcart: self-hosted clothing storefront service.
//!
//! ## Features
//! - Product catalog with per-variant (color × size) stock tracking
//! - Per-user carts and address books embedded in the user document
//! - Inventory-safe checkout: atomic multi-line stock decrement, no
//!   overselling under concurrent orders
//! - Cart and buy-now order flows with price captured at order time
//! - Human-readable collision-checked order ids
//! - Coupon application at checkout

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
