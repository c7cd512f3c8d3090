//! Payment bridge between the gateway and order state.

use std::collections::BTreeMap;
use std::str::FromStr;

use common::{AggregateId, Caller};
use domain::order::RefundPayment;
use domain::{
    DomainError, ErrorKind, InventoryHold, Money, Order, OrderError, PaymentMethod, PaymentStatus,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::lifecycle::{OrderLifecycle, authorize_access, authorize_owner};
use crate::services::payment::{INTENT_FAILED, INTENT_SUCCEEDED};
use crate::services::{IntentRequest, IntentStatus, Notifier, PaymentGateway, PaymentIntent};
use crate::steps::stock_lines;

/// What the client needs to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentHandle {
    pub client_secret: String,
    pub intent_id: String,
}

/// How a verified webhook was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    PaymentSucceeded(AggregateId),
    PaymentFailed(AggregateId),
    /// Acknowledged without touching any order.
    Ignored(String),
}

impl<S, P, N> OrderLifecycle<S, P, N>
where
    S: EventStore,
    P: PaymentGateway,
    N: Notifier,
{
    /// Opens a payment intent for the order total.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment_intent(
        &self,
        caller: Caller,
        order_id: AggregateId,
    ) -> Result<IntentHandle> {
        let order = self.load(order_id).await?;
        authorize_owner(caller, &order)?;
        if order.payment_status() != PaymentStatus::Pending {
            return Err(DomainError::from(OrderError::PaymentNotPending {
                status: order.payment_status(),
            })
            .into());
        }
        if order.payment_method() == PaymentMethod::Cod {
            return Err(CheckoutError::PaymentMethodNotSupported(
                PaymentMethod::Cod.as_str(),
            ));
        }

        let intent = self
            .gateway
            .create_intent(IntentRequest {
                amount_cents: order.total().cents(),
                currency: self.policy.currency.clone(),
                metadata: BTreeMap::from([
                    ("order_id".to_string(), order_id.to_string()),
                    ("user_id".to_string(), caller.user_id.to_string()),
                ]),
            })
            .await?;
        tracing::info!(
            %order_id,
            intent_id = %intent.id,
            amount = %order.total(),
            "Payment intent created"
        );
        Ok(IntentHandle {
            client_secret: intent.client_secret,
            intent_id: intent.id,
        })
    }

    /// Client-driven confirmation: checks the intent with the gateway and marks
    /// the order paid when it succeeded.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        caller: Caller,
        order_id: AggregateId,
        intent_id: &str,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        authorize_access(caller, &order)?;

        let intent = self.gateway.retrieve_intent(intent_id).await?;
        if let Some(intent_order) = intent.order_id()
            && intent_order != order_id.to_string()
        {
            return Err(CheckoutError::IntentMismatch(order_id));
        }
        if intent.status != IntentStatus::Succeeded {
            return Err(CheckoutError::PaymentNotSucceeded(intent.status.as_str()));
        }
        self.mark_paid(order_id, &intent.id).await
    }

    /// Applies a gateway webhook. The signature is checked before anything
    /// else; replays of an already-applied outcome change nothing.
    #[tracing::instrument(skip(self, payload, signature))]
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome> {
        let event = match self.gateway.verify_webhook(payload, signature) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "Rejected payment webhook");
                return Err(err.into());
            }
        };

        let handled = match event.event_type.as_str() {
            INTENT_SUCCEEDED | INTENT_FAILED => event.event_type.as_str(),
            other => {
                tracing::info!(event_type = other, "Unhandled payment webhook");
                return Ok(WebhookOutcome::Ignored(other.to_string()));
            }
        };
        let Some(order_id) = webhook_order(&event.data.object) else {
            tracing::warn!(
                intent_id = %event.data.object.id,
                "Payment webhook without order reference"
            );
            return Ok(WebhookOutcome::Ignored(handled.to_string()));
        };

        let result = if handled == INTENT_SUCCEEDED {
            self.mark_paid(order_id, &event.data.object.id)
                .await
                .map(|_| WebhookOutcome::PaymentSucceeded(order_id))
        } else {
            self.mark_payment_failed(order_id, Some("Payment failed".to_string()))
                .await
                .map(|_| WebhookOutcome::PaymentFailed(order_id))
        };

        match result {
            Err(CheckoutError::OrderNotFound(_)) => {
                tracing::warn!(%order_id, "Payment webhook for unknown order");
                Ok(WebhookOutcome::Ignored(handled.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::InvalidState => {
                tracing::warn!(%order_id, error = %err, "Payment webhook does not apply to order");
                Ok(WebhookOutcome::Ignored(handled.to_string()))
            }
            other => other,
        }
    }

    /// Refunds a paid order through the gateway, fully when `amount` is `None`.
    ///
    /// The refund is recorded as requested before the gateway is called, so a
    /// second refund of the same order is refused while the first is in
    /// flight. A gateway failure clears the request.
    #[tracing::instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        caller: Caller,
        order_id: AggregateId,
        amount: Option<Money>,
        reason: &str,
    ) -> Result<Order> {
        if !caller.is_admin() {
            return Err(CheckoutError::Forbidden);
        }
        self.load(order_id).await?;
        let mut cmd = RefundPayment::full(order_id, reason).by(caller.user_id);
        cmd.amount = amount;
        let order = self.services.orders.request_refund(&cmd).await?.aggregate;

        let transaction_id = order
            .payment()
            .map(|p| p.transaction_id.clone())
            .unwrap_or_default();
        let receipt = match self.gateway.refund(&transaction_id, amount, reason).await {
            Ok(receipt) => receipt,
            Err(err) => {
                if let Err(record_err) = self
                    .services
                    .orders
                    .fail_refund(order_id, &err.to_string())
                    .await
                {
                    tracing::error!(%order_id, error = %record_err, "Failed to clear refund request");
                }
                metrics::counter!("payments_recorded_total", "outcome" => "refund_failed")
                    .increment(1);
                return Err(err.into());
            }
        };

        let refunded = self
            .services
            .orders
            .refund_payment(cmd.with_refund_id(receipt.id))
            .await?
            .aggregate;

        if let (Some(code), Some(owner)) = (refunded.coupon_code(), refunded.user_id())
            && self.policy.coupon_usage.reverts_on_failure()
        {
            self.revert_coupon(code, owner).await;
        }
        metrics::counter!("payments_recorded_total", "outcome" => "refunded").increment(1);
        tracing::info!(
            order_number = refunded.order_number(),
            payment_status = %refunded.payment_status(),
            "Payment refunded"
        );
        Ok(refunded)
    }

    /// Marks an order paid. A pending order is confirmed and its reserved
    /// stock deducted in the same step. Only the caller that claims the hold
    /// deducts, so duplicate deliveries move stock once.
    pub(crate) async fn mark_paid(
        &self,
        order_id: AggregateId,
        transaction_id: &str,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        if order.payment_status() == PaymentStatus::Paid {
            return Ok(order);
        }
        let now = self.services.clock.now();
        order
            .record_payment_success(transaction_id, self.gateway.provider(), now)
            .map_err(DomainError::from)?;

        let lines = stock_lines(order.items());
        let committed = if order.inventory() == InventoryHold::Reserved {
            self.commit_hold(order_id, &lines).await?
        } else {
            false
        };
        let result = match self
            .services
            .orders
            .record_payment_success(order_id, transaction_id, self.gateway.provider())
            .await
        {
            Ok(result) => result,
            Err(err) => {
                if committed {
                    self.undo_commit(order_id, &lines).await;
                }
                return Err(err.into());
            }
        };
        let paid = result.aggregate;
        if result.events.is_empty() {
            return Ok(paid);
        }

        metrics::counter!("payments_recorded_total", "outcome" => "succeeded").increment(1);
        tracing::info!(order_number = paid.order_number(), transaction_id, "Payment recorded");
        self.notify_status(&paid).await;
        Ok(paid)
    }

    /// Fails the order and gives its reservation back.
    pub(crate) async fn mark_payment_failed(
        &self,
        order_id: AggregateId,
        reason: Option<String>,
    ) -> Result<Order> {
        let result = self
            .services
            .orders
            .record_payment_failure(order_id, reason)
            .await?;
        if result.events.is_empty() {
            return Ok(result.aggregate);
        }
        let failed = result.aggregate;

        let failed = if failed.inventory() == InventoryHold::Reserved
            && self
                .release_hold(order_id, &stock_lines(failed.items()))
                .await?
        {
            self.load(order_id).await?
        } else {
            failed
        };

        if let (Some(code), Some(owner)) = (failed.coupon_code(), failed.user_id())
            && self.policy.coupon_usage.reverts_on_failure()
        {
            self.revert_coupon(code, owner).await;
        }
        metrics::counter!("payments_recorded_total", "outcome" => "failed").increment(1);
        tracing::warn!(order_number = failed.order_number(), "Payment failed");
        Ok(failed)
    }
}

fn webhook_order(intent: &PaymentIntent) -> Option<AggregateId> {
    intent.order_id().and_then(|id| AggregateId::from_str(id).ok())
}
