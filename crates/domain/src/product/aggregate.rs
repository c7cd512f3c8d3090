//! Product aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::money::Money;

use super::{ProductCreatedData, ProductEvent, ProductStatus, Stock, StockError};

/// Catalog fields for a new product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub price: Money,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub seller: Option<UserId>,
    pub quantity: u32,
    #[serde(default)]
    pub low_stock_threshold: Option<u32>,
}

/// Product aggregate root. Owns the stock ledger for one catalog entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    name: String,
    sku: String,
    price: Money,
    image: Option<String>,
    seller: Option<UserId>,
    status: ProductStatus,
    stock: Stock,

    /// Units sold over the product's lifetime.
    sales: u32,

    created_at: Option<DateTime<Utc>>,
}

impl Aggregate for Product {
    type Event = ProductEvent;
    type Error = StockError;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ProductEvent::ProductCreated(data) => self.apply_created(data),
            ProductEvent::StockReserved { quantity } => {
                self.stock.reserved = self.stock.reserved.saturating_add(quantity);
            }
            ProductEvent::StockReleased { quantity } => {
                self.stock.reserved = self.stock.reserved.saturating_sub(quantity);
            }
            ProductEvent::StockDeducted { quantity } => {
                self.stock.quantity = self.stock.quantity.saturating_sub(quantity);
                self.stock.reserved = self.stock.reserved.saturating_sub(quantity);
                self.sales = self.sales.saturating_add(quantity);
                if self.stock.quantity == 0 {
                    self.status = ProductStatus::OutOfStock;
                }
            }
            ProductEvent::DeductionReverted { quantity } => {
                self.stock.quantity = self.stock.quantity.saturating_add(quantity);
                self.stock.reserved = self.stock.reserved.saturating_add(quantity);
                self.sales = self.sales.saturating_sub(quantity);
                self.reopen_if_restocked();
            }
            ProductEvent::StockRestored { quantity } => {
                self.stock.quantity = self.stock.quantity.saturating_add(quantity);
                self.sales = self.sales.saturating_sub(quantity);
                self.reopen_if_restocked();
            }
            ProductEvent::StockRestocked { quantity } => {
                self.stock.quantity = self.stock.quantity.saturating_add(quantity);
                self.reopen_if_restocked();
            }
            ProductEvent::PriceChanged { new_price, .. } => {
                self.price = new_price;
            }
            ProductEvent::StatusChanged { to, .. } => {
                self.status = to;
            }
        }
    }
}

impl SnapshotCapable for Product {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Product {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn seller(&self) -> Option<UserId> {
        self.seller
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn stock(&self) -> Stock {
        self.stock
    }

    pub fn sales(&self) -> u32 {
        self.sales
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_in_stock(&self, quantity: u32) -> bool {
        self.stock.is_in_stock(quantity)
    }

    /// Whether a shopper may put this product in a cart.
    pub fn is_purchasable(&self) -> bool {
        self.id.is_some() && self.status == ProductStatus::Active
    }
}

// Command methods (return events)
impl Product {
    pub fn create(
        &self,
        product_id: AggregateId,
        product: NewProduct,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProductEvent>, StockError> {
        if self.id.is_some() {
            return Err(StockError::AlreadyExists);
        }
        if product.name.trim().is_empty() {
            return Err(StockError::InvalidProduct("name is required"));
        }
        if product.sku.trim().is_empty() {
            return Err(StockError::InvalidProduct("sku is required"));
        }
        if product.price.is_negative() {
            return Err(StockError::InvalidPrice {
                price: product.price.cents(),
            });
        }

        Ok(vec![ProductEvent::ProductCreated(ProductCreatedData {
            product_id,
            name: product.name.trim().to_string(),
            sku: product.sku.trim().to_string(),
            price: product.price,
            image: product.image,
            seller: product.seller,
            quantity: product.quantity,
            low_stock_threshold: product
                .low_stock_threshold
                .unwrap_or(super::stock::DEFAULT_LOW_STOCK_THRESHOLD),
            created_at: now,
        })])
    }

    /// Holds `quantity` units for an order that is not yet confirmed.
    pub fn reserve(&self, quantity: u32) -> Result<Vec<ProductEvent>, StockError> {
        self.ensure_exists()?;
        ensure_positive(quantity)?;
        if !self.stock.is_in_stock(quantity) {
            return Err(StockError::InsufficientStock {
                requested: quantity,
                available: self.stock.available(),
            });
        }
        Ok(vec![ProductEvent::StockReserved { quantity }])
    }

    /// Returns reserved units to the available pool, never below zero.
    pub fn release(&self, quantity: u32) -> Result<Vec<ProductEvent>, StockError> {
        self.ensure_exists()?;
        let released = quantity.min(self.stock.reserved);
        if released == 0 {
            return Ok(vec![]);
        }
        Ok(vec![ProductEvent::StockReleased { quantity: released }])
    }

    /// Converts reserved units into a sale.
    pub fn deduct(&self, quantity: u32) -> Result<Vec<ProductEvent>, StockError> {
        self.ensure_exists()?;
        ensure_positive(quantity)?;
        if self.stock.reserved < quantity {
            return Err(StockError::OverDeduction {
                requested: quantity,
                reserved: self.stock.reserved,
            });
        }
        Ok(vec![ProductEvent::StockDeducted { quantity }])
    }

    pub fn revert_deduction(&self, quantity: u32) -> Result<Vec<ProductEvent>, StockError> {
        self.ensure_exists()?;
        ensure_positive(quantity)?;
        self.ensure_room_for(quantity)?;
        Ok(vec![ProductEvent::DeductionReverted { quantity }])
    }

    pub fn restore(&self, quantity: u32) -> Result<Vec<ProductEvent>, StockError> {
        self.ensure_exists()?;
        ensure_positive(quantity)?;
        self.ensure_room_for(quantity)?;
        Ok(vec![ProductEvent::StockRestored { quantity }])
    }

    pub fn restock(&self, quantity: u32) -> Result<Vec<ProductEvent>, StockError> {
        self.ensure_exists()?;
        ensure_positive(quantity)?;
        self.ensure_room_for(quantity)?;
        Ok(vec![ProductEvent::StockRestocked { quantity }])
    }

    pub fn change_price(&self, price: Money) -> Result<Vec<ProductEvent>, StockError> {
        self.ensure_exists()?;
        if price.is_negative() {
            return Err(StockError::InvalidPrice {
                price: price.cents(),
            });
        }
        if price == self.price {
            return Ok(vec![]);
        }
        Ok(vec![ProductEvent::PriceChanged {
            old_price: self.price,
            new_price: price,
        }])
    }

    pub fn set_status(&self, status: ProductStatus) -> Result<Vec<ProductEvent>, StockError> {
        self.ensure_exists()?;
        if status == self.status {
            return Ok(vec![]);
        }
        Ok(vec![ProductEvent::StatusChanged {
            from: self.status,
            to: status,
        }])
    }

    fn ensure_exists(&self) -> Result<(), StockError> {
        if self.id.is_none() {
            return Err(StockError::NotFound);
        }
        Ok(())
    }

    /// Refuses additions that would overflow on-hand stock.
    fn ensure_room_for(&self, quantity: u32) -> Result<(), StockError> {
        match self.stock.quantity.checked_add(quantity) {
            Some(_) => Ok(()),
            None => Err(StockError::QuantityOverflow {
                quantity,
                on_hand: self.stock.quantity,
            }),
        }
    }
}

fn ensure_positive(quantity: u32) -> Result<(), StockError> {
    if quantity == 0 {
        return Err(StockError::InvalidQuantity { quantity });
    }
    Ok(())
}

// Apply event helpers
impl Product {
    fn apply_created(&mut self, data: ProductCreatedData) {
        self.id = Some(data.product_id);
        self.name = data.name;
        self.sku = data.sku;
        self.price = data.price;
        self.image = data.image;
        self.seller = data.seller;
        self.stock = Stock::new(data.quantity, data.low_stock_threshold);
        self.status = if data.quantity == 0 {
            ProductStatus::OutOfStock
        } else {
            ProductStatus::Active
        };
        self.created_at = Some(data.created_at);
    }

    fn reopen_if_restocked(&mut self) {
        if self.status == ProductStatus::OutOfStock && self.stock.quantity > 0 {
            self.status = ProductStatus::Active;
        }
    }
}
