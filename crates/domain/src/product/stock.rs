use serde::{Deserialize, Serialize};

/// Default low-stock threshold for products that don't set one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

/// On-hand and reserved units of one product.
///
/// `reserved <= quantity` holds after every event; the aggregate refuses any
/// command that would break it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub quantity: u32,
    pub reserved: u32,
    pub low_stock_threshold: u32,
}

impl Stock {
    pub fn new(quantity: u32, low_stock_threshold: u32) -> Self {
        Self {
            quantity,
            reserved: 0,
            low_stock_threshold,
        }
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> u32 {
        self.quantity.saturating_sub(self.reserved)
    }

    pub fn is_in_stock(&self, quantity: u32) -> bool {
        self.available() >= quantity
    }

    pub fn is_low(&self) -> bool {
        self.quantity <= self.low_stock_threshold
    }
}

impl Default for Stock {
    fn default() -> Self {
        Self::new(0, DEFAULT_LOW_STOCK_THRESHOLD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    #[default]
    Active,
    Inactive,
    OutOfStock,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
            ProductStatus::OutOfStock => "out_of_stock",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(ProductStatus::Draft),
            "active" => Some(ProductStatus::Active),
            "inactive" => Some(ProductStatus::Inactive),
            "out_of_stock" => Some(ProductStatus::OutOfStock),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_excludes_reserved_units() {
        let stock = Stock {
            quantity: 5,
            reserved: 3,
            low_stock_threshold: 2,
        };
        assert_eq!(stock.available(), 2);
        assert!(stock.is_in_stock(2));
        assert!(!stock.is_in_stock(3));
        assert!(!stock.is_low());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ProductStatus::Draft,
            ProductStatus::Active,
            ProductStatus::Inactive,
            ProductStatus::OutOfStock,
        ] {
            assert_eq!(ProductStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            serde_json::to_string(&ProductStatus::OutOfStock).unwrap(),
            "\"out_of_stock\""
        );
    }
}
