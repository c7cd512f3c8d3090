//! Read models for the storefront query side.
//!
//! - [`Projection`] folds store events into a read model
//! - [`ReadModel`] exposes query access to the folded data
//! - [`ProjectionProcessor`] feeds events from the store to projections
//! - Views: per-user order listing, sales statistics, inventory report

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{
    CustomerOrdersView, InventoryReport, InventoryView, OrderPage, OrderQuery, OrderStats,
    OrderStatsView, OrderSummary, StatusBreakdown, StockLevel,
};
