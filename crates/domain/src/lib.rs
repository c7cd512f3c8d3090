//! Domain layer for the storefront.
//!
//! Event-sourced aggregates for the catalog stock ledger, coupons, carts and
//! orders, plus the command handler that persists them with optimistic
//! concurrency.

pub mod aggregate;
pub mod cart;
pub mod clock;
pub mod command;
pub mod coupon;
pub mod error;
pub mod money;
pub mod order;
pub mod product;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use cart::{Cart, CartError, CartEvent, CartItem, CartService, Variant};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, CommandHandler, CommandResult, DEFAULT_RETRY_ATTEMPTS};
pub use coupon::{
    AppliedCoupon, Coupon, CouponError, CouponEvent, CouponService, Discount, Ineligibility,
    NewCoupon,
};
pub use error::{DomainError, ErrorKind};
pub use money::{Money, Rate};
pub use order::{
    Address, InventoryHold, NewOrder, Order, OrderError, OrderEvent, OrderItem, OrderPricing,
    OrderService, OrderStatus, PaymentMethod, PaymentStatus, PricingPolicy, ReturnStatus,
    ShippingMethod,
};
pub use product::{NewProduct, Product, ProductEvent, ProductService, ProductStatus, StockError};
