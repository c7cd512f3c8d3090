//! Multi-aggregate storefront workflows.
//!
//! The aggregates in `domain` each guard their own invariants. This crate
//! coordinates them:
//! - [`CartManager`] checks the catalog and coupons before cart writes
//! - [`OrderLifecycle`] runs checkout as a saga with compensations, plus
//!   cancellation, returns and operator status updates
//! - the payment bridge on [`OrderLifecycle`] turns gateway outcomes into
//!   order state
//!
//! The payment gateway and notifier are injected, so tests substitute the
//! in-memory implementations in [`services`].

pub mod cart;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod payments;
pub mod policy;
pub mod services;
pub mod steps;

pub use cart::CartManager;
pub use context::DomainServices;
pub use error::CheckoutError;
pub use lifecycle::{CheckoutRequest, OrderLifecycle, StatusUpdate};
pub use payments::{IntentHandle, WebhookOutcome};
pub use policy::{CheckoutPolicy, CouponUsagePolicy, ServiceSettings};
pub use services::{
    InMemoryNotifier, InMemoryPaymentGateway, Notification, Notifier, PaymentGateway,
    TracingNotifier,
};
