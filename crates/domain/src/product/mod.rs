//! Product aggregate and its stock ledger.

mod aggregate;
mod events;
mod service;
mod stock;

pub use aggregate::{NewProduct, Product};
pub use events::{ProductCreatedData, ProductEvent};
pub use service::ProductService;
pub use stock::{DEFAULT_LOW_STOCK_THRESHOLD, ProductStatus, Stock};

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors raised by the stock ledger.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("Product not found")]
    NotFound,

    #[error("Product already exists")]
    AlreadyExists,

    /// Stock operations move at least one unit.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    #[error("Invalid product: {0}")]
    InvalidProduct(&'static str),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    /// More units were deducted than are held in reservation.
    #[error("Cannot deduct {requested} units, only {reserved} reserved")]
    OverDeduction { requested: u32, reserved: u32 },

    #[error("Adding {quantity} units to {on_hand} on hand exceeds the stock limit")]
    QuantityOverflow { quantity: u32, on_hand: u32 },
}

impl StockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StockError::NotFound => ErrorKind::NotFound,
            StockError::AlreadyExists => ErrorKind::Conflict,
            StockError::InvalidQuantity { .. }
            | StockError::QuantityOverflow { .. }
            | StockError::InvalidPrice { .. }
            | StockError::InvalidProduct(_) => ErrorKind::InvalidInput,
            StockError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            StockError::OverDeduction { .. } => ErrorKind::OverDeduction,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            StockError::NotFound => "product_not_found",
            StockError::AlreadyExists => "product_exists",
            StockError::InvalidQuantity { .. } => "invalid_quantity",
            StockError::InvalidPrice { .. } => "invalid_price",
            StockError::InvalidProduct(_) => "invalid_product",
            StockError::InsufficientStock { .. } => "insufficient_stock",
            StockError::OverDeduction { .. } => "over_deduction",
            StockError::QuantityOverflow { .. } => "invalid_quantity",
        }
    }
}
