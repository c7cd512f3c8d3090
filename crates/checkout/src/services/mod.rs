//! Collaborators injected into the order lifecycle.

pub mod notifier;
pub mod payment;

pub use notifier::{Channel, InMemoryNotifier, Notification, Notifier, NotifyError, TracingNotifier};
pub use payment::{
    GatewayError, InMemoryPaymentGateway, IntentRequest, IntentStatus, PaymentGateway,
    PaymentIntent, RefundReceipt, WebhookEvent,
};
