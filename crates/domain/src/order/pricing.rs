//! Order pricing: tax, shipping and the final total.

use serde::{Deserialize, Serialize};

use crate::money::{Money, Rate};

use super::ShippingMethod;

/// Store-wide pricing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub tax_rate: Rate,
    /// Subtotals at or above this ship for free.
    pub free_shipping_threshold: Money,
    /// Standard rate. Overnight is charged at this rate too.
    pub standard_shipping: Money,
    pub express_shipping: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Rate::from_basis_points(800),
            free_shipping_threshold: Money::from_dollars(50),
            standard_shipping: Money::from_cents(599),
            express_shipping: Money::from_cents(1499),
        }
    }
}

impl PricingPolicy {
    pub fn shipping_cost(&self, method: ShippingMethod, subtotal: Money) -> Money {
        if subtotal >= self.free_shipping_threshold {
            return Money::zero();
        }
        match method {
            ShippingMethod::Express => self.express_shipping,
            ShippingMethod::Standard | ShippingMethod::Overnight => self.standard_shipping,
        }
    }

    /// Prices an order. Tax is charged on the undiscounted subtotal.
    pub fn quote(&self, subtotal: Money, discount: Money, method: ShippingMethod) -> OrderPricing {
        let tax = self.tax_rate.apply(subtotal);
        let shipping_cost = self.shipping_cost(method, subtotal);
        OrderPricing {
            subtotal,
            tax,
            tax_rate: self.tax_rate,
            shipping_cost,
            discount,
            total: (subtotal + tax + shipping_cost - discount).non_negative(),
        }
    }
}

/// Pricing fields frozen onto an order.
///
/// `total = max(0, subtotal + tax + shipping_cost - discount)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPricing {
    pub subtotal: Money,
    pub tax: Money,
    pub tax_rate: Rate,
    pub shipping_cost: Money,
    pub discount: Money,
    pub total: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_shipping_at_threshold() {
        let policy = PricingPolicy {
            free_shipping_threshold: Money::from_dollars(40),
            ..PricingPolicy::default()
        };

        let pricing = policy.quote(Money::from_dollars(40), Money::zero(), ShippingMethod::Standard);

        assert_eq!(pricing.tax, Money::from_cents(320));
        assert_eq!(pricing.shipping_cost, Money::zero());
        assert_eq!(pricing.total, Money::from_cents(4320));
    }

    #[test]
    fn shipping_rates_below_threshold() {
        let policy = PricingPolicy::default();
        let subtotal = Money::from_dollars(10);

        assert_eq!(
            policy.shipping_cost(ShippingMethod::Standard, subtotal),
            Money::from_cents(599)
        );
        assert_eq!(
            policy.shipping_cost(ShippingMethod::Overnight, subtotal),
            Money::from_cents(599)
        );
        assert_eq!(
            policy.shipping_cost(ShippingMethod::Express, subtotal),
            Money::from_cents(1499)
        );
    }

    #[test]
    fn total_is_clamped_at_zero() {
        let policy = PricingPolicy::default();
        let pricing = policy.quote(
            Money::from_dollars(1),
            Money::from_dollars(100),
            ShippingMethod::Standard,
        );
        assert_eq!(pricing.total, Money::zero());
    }

    #[test]
    fn total_identity_holds() {
        let policy = PricingPolicy::default();
        for cents in [1, 999, 4999, 5000, 12_345] {
            let subtotal = Money::from_cents(cents);
            let discount = Money::from_cents(cents / 10);
            let p = policy.quote(subtotal, discount, ShippingMethod::Express);
            assert_eq!(p.total, p.subtotal + p.tax + p.shipping_cost - p.discount);
        }
    }
}
