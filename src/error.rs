//! Business error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("cart is empty")]
    EmptyCart,

    #[error("cart contains unavailable items: {}", .0.join(", "))]
    ItemsUnavailable(Vec<String>),

    #[error("insufficient stock for {variant_key}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_key: String,
        requested: i32,
        available: i32,
    },

    #[error("no inventory record for variant {0}")]
    InventoryInconsistency(String),

    #[error("no shipping address on file")]
    NoShippingAddress,

    #[error("address limit reached")]
    AddressLimitReached,

    #[error("cannot delete the last remaining address")]
    MustKeepOneAddress,

    #[error("could not allocate a unique order id")]
    IdGenerationExhausted,

    #[error("concurrent update conflict, retry the request")]
    Conflict,

    #[error("operation timed out")]
    Timeout,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::EmptyCart => "EMPTY_CART",
            Self::ItemsUnavailable(_) => "ITEMS_UNAVAILABLE",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::InventoryInconsistency(_) => "INVENTORY_INCONSISTENCY",
            Self::NoShippingAddress => "NO_SHIPPING_ADDRESS",
            Self::AddressLimitReached => "ADDRESS_LIMIT_REACHED",
            Self::MustKeepOneAddress => "MUST_KEEP_ONE_ADDRESS",
            Self::IdGenerationExhausted => "ID_GENERATION_EXHAUSTED",
            Self::Conflict => "CONFLICT",
            Self::Timeout => "TIMEOUT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured payload for errors the UI must act on: which variant is
    /// short and by how much, or which cart lines went stale.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientStock {
                variant_key,
                requested,
                available,
            } => Some(serde_json::json!({
                "variant_key": variant_key,
                "requested": requested,
                "available": available,
            })),
            Self::ItemsUnavailable(ids) => Some(serde_json::json!({ "item_ids": ids })),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation(_)
            | Self::EmptyCart
            | Self::ItemsUnavailable(_)
            | Self::InsufficientStock { .. }
            | Self::InventoryInconsistency(_)
            | Self::NoShippingAddress
            | Self::AddressLimitReached
            | Self::MustKeepOneAddress => StatusCode::BAD_REQUEST,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::IdGenerationExhausted | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Business errors travel to the caller verbatim; unexpected failures
        // are logged here and returned opaque.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, code = self.code(), "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: self.code(),
            message,
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}
