//! Cart aggregate: one per user, lazily created, lazily expired.

mod aggregate;
mod events;
mod service;

pub use aggregate::{Cart, CartItem, Variant};
pub use events::CartEvent;
pub use service::{CartService, DEFAULT_CART_TTL_DAYS, cart_id};

use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("Cart not found")]
    NotFound,

    #[error("Cart already exists")]
    AlreadyExists,

    #[error("Item not found in cart")]
    ItemNotFound,

    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },
}

impl CartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::NotFound | CartError::ItemNotFound => ErrorKind::NotFound,
            CartError::AlreadyExists => ErrorKind::Conflict,
            CartError::InvalidQuantity { .. } | CartError::InvalidPrice { .. } => {
                ErrorKind::InvalidInput
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CartError::NotFound => "cart_not_found",
            CartError::AlreadyExists => "cart_exists",
            CartError::ItemNotFound => "item_not_found",
            CartError::InvalidQuantity { .. } => "invalid_quantity",
            CartError::InvalidPrice { .. } => "invalid_price",
        }
    }
}
