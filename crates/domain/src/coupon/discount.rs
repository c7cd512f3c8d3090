use serde::{Deserialize, Serialize};

use crate::money::{Money, Rate};

/// How a coupon reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discount {
    /// Whole percent of the subtotal.
    Percentage { percent: u32 },
    Fixed { amount: Money },
}

impl Discount {
    /// Discount for `subtotal`. The cap only limits percentage discounts, and
    /// the result always lies in `[0, subtotal]`.
    pub fn amount_for(&self, subtotal: Money, cap: Option<Money>) -> Money {
        let raw = match self {
            Discount::Percentage { percent } => {
                let amount = Rate::from_percent(*percent).apply(subtotal);
                match cap {
                    Some(cap) => amount.min(cap),
                    None => amount,
                }
            }
            Discount::Fixed { amount } => *amount,
        };
        raw.non_negative().min(subtotal.non_negative())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Discount::Percentage { .. } => "percentage",
            Discount::Fixed { .. } => "fixed",
        }
    }
}

/// The coupon terms a cart carries once a coupon has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: Discount,
    #[serde(default)]
    pub maximum_discount: Option<Money>,
}

impl AppliedCoupon {
    pub fn amount_for(&self, subtotal: Money) -> Money {
        self.discount.amount_for(subtotal, self.maximum_discount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_capped_by_maximum() {
        let discount = Discount::Percentage { percent: 10 };
        assert_eq!(
            discount.amount_for(Money::from_dollars(100), Some(Money::from_dollars(5))),
            Money::from_dollars(5)
        );
        assert_eq!(
            discount.amount_for(Money::from_dollars(30), Some(Money::from_dollars(5))),
            Money::from_dollars(3)
        );
    }

    #[test]
    fn fixed_never_exceeds_subtotal_and_ignores_cap() {
        let discount = Discount::Fixed {
            amount: Money::from_dollars(25),
        };
        assert_eq!(
            discount.amount_for(Money::from_dollars(10), None),
            Money::from_dollars(10)
        );
        assert_eq!(
            discount.amount_for(Money::from_dollars(100), Some(Money::from_dollars(5))),
            Money::from_dollars(25)
        );
    }

    #[test]
    fn discount_stays_within_zero_and_subtotal() {
        let discounts = [
            Discount::Percentage { percent: 0 },
            Discount::Percentage { percent: 15 },
            Discount::Percentage { percent: 100 },
            Discount::Percentage { percent: 250 },
            Discount::Fixed {
                amount: Money::from_cents(-300),
            },
            Discount::Fixed {
                amount: Money::from_cents(999),
            },
        ];
        for subtotal in [0, 1, 99, 1000, 123_456] {
            let subtotal = Money::from_cents(subtotal);
            for discount in discounts {
                for cap in [None, Some(Money::from_cents(50))] {
                    let amount = discount.amount_for(subtotal, cap);
                    assert!(!amount.is_negative(), "{discount:?} on {subtotal}");
                    assert!(amount <= subtotal, "{discount:?} on {subtotal}");
                }
            }
        }
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(Discount::Percentage { percent: 10 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "percentage", "percent": 10}));
    }
}
