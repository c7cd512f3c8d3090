//! Customer notifications.
//!
//! Delivery is best effort: the lifecycle logs and counts a failed delivery
//! and carries on. Order state never depends on it.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::UserId;
use domain::{Money, OrderStatus};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Sms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    OrderConfirmation {
        user_id: UserId,
        order_number: String,
        total: Money,
    },
    OrderCancelled {
        user_id: UserId,
        order_number: String,
        reason: String,
    },
    OrderStatusUpdated {
        user_id: UserId,
        order_number: String,
        status: OrderStatus,
    },
    OrderShipped {
        user_id: UserId,
        order_number: String,
        phone: String,
        tracking_number: Option<String>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::OrderConfirmation { .. } => "order_confirmation",
            Notification::OrderCancelled { .. } => "order_cancelled",
            Notification::OrderStatusUpdated { .. } => "order_status_updated",
            Notification::OrderShipped { .. } => "order_shipped",
        }
    }

    pub fn order_number(&self) -> &str {
        match self {
            Notification::OrderConfirmation { order_number, .. }
            | Notification::OrderCancelled { order_number, .. }
            | Notification::OrderStatusUpdated { order_number, .. }
            | Notification::OrderShipped { order_number, .. } => order_number,
        }
    }

    /// Shipping updates go out by SMS, everything else by email.
    pub fn channel(&self) -> Channel {
        match self {
            Notification::OrderShipped { .. } => Channel::Sms,
            _ => Channel::Email,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log, honouring the per-channel switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier {
    email_enabled: bool,
    sms_enabled: bool,
}

impl TracingNotifier {
    pub fn new(email_enabled: bool, sms_enabled: bool) -> Self {
        Self {
            email_enabled,
            sms_enabled,
        }
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let enabled = match notification.channel() {
            Channel::Email => self.email_enabled,
            Channel::Sms => self.sms_enabled,
        };
        if !enabled {
            tracing::debug!(kind = notification.kind(), "Notification channel disabled");
            return Ok(());
        }
        tracing::info!(
            kind = notification.kind(),
            channel = ?notification.channel(),
            order_number = notification.order_number(),
            "Notification sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Notification>,
    fail: bool,
}

/// Records deliveries for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail = fail;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.sent().iter().filter(|n| n.kind() == kind).count()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(NotifyError("smtp unavailable".to_string()));
        }
        state.sent.push(notification);
        Ok(())
    }
}
