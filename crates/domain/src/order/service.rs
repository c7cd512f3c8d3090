//! Order service.

use std::sync::Arc;

use common::AggregateId;
use event_store::EventStore;

use crate::clock::Clock;
use crate::command::{Command, CommandHandler, CommandResult, DEFAULT_RETRY_ATTEMPTS};
use crate::error::DomainError;

use super::{
    CancelOrder, ChangeOrderStatus, InventoryHold, NewOrder, Order, OrderError, OrderEvent,
    RefundPayment, RequestReturn, UpdateReturnStatus, UpdateShipment, generate_order_number,
};

pub const DEFAULT_RETURN_WINDOW_DAYS: i64 = 30;

/// Order streams are keyed by order number, so a number can only be placed once.
pub fn order_id_for(order_number: &str) -> AggregateId {
    AggregateId::from_key("order", order_number)
}

/// Service for managing orders.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
    clock: Arc<dyn Clock>,
    retry_attempts: u32,
    return_window_days: i64,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            clock,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            return_window_days: DEFAULT_RETURN_WINDOW_DAYS,
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    pub fn with_return_window_days(mut self, days: i64) -> Self {
        self.return_window_days = days;
        self
    }

    pub fn return_window_days(&self) -> i64 {
        self.return_window_days
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Places a new order under a freshly generated order number.
    ///
    /// A number collision shows up as an existing stream; a new number is
    /// drawn and the write retried.
    #[tracing::instrument(skip(self, order), fields(user_id = %order.user_id))]
    pub async fn place_order(&self, order: NewOrder) -> Result<CommandResult<Order>, DomainError> {
        let mut attempt = 1;
        loop {
            let now = self.clock.now();
            let number = generate_order_number(now);
            let id = order_id_for(&number);
            let draft = order.clone();

            match self
                .handler
                .execute(id, |o| o.place(id, number.clone(), draft, now))
                .await
            {
                Err(err)
                    if attempt < self.retry_attempts
                        && (err.is_conflict()
                            || matches!(err, DomainError::Order(OrderError::AlreadyExists))) =>
                {
                    tracing::debug!(order_number = %number, attempt, "Order number collision, regenerating");
                    attempt += 1;
                }
                Ok(result) => {
                    tracing::info!(
                        order_id = %id,
                        order_number = %number,
                        total = %result.aggregate.total(),
                        "Order placed"
                    );
                    return Ok(result);
                }
                Err(err) => return Err(err),
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_number(&self, order_number: &str) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id_for(order_number)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_inventory_hold(
        &self,
        order_id: AggregateId,
        hold: InventoryHold,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.write(order_id, |o| o.set_inventory_hold(hold)).await
    }

    /// Moves the hold from `from` to `to` in one conditional append.
    ///
    /// Returns `false` when another writer moved the hold first; the caller
    /// must then leave stock alone.
    pub async fn claim_hold(
        &self,
        order_id: AggregateId,
        from: InventoryHold,
        to: InventoryHold,
    ) -> Result<bool, DomainError> {
        match self.write(order_id, |o| o.transition_hold(from, to)).await {
            Ok(_) => Ok(true),
            Err(DomainError::Order(OrderError::HoldMismatch { actual, .. })) => {
                tracing::debug!(%order_id, ?from, ?to, ?actual, "Inventory hold already moved");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        cmd: ChangeOrderStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(cmd.aggregate_id(), |o| {
            o.change_status(cmd.status, cmd.note.clone(), cmd.updated_by, now)
        })
        .await
    }

    /// Marks an order failed. Terminal orders are left as they are.
    #[tracing::instrument(skip(self))]
    pub async fn fail_order(
        &self,
        order_id: AggregateId,
        note: &str,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(order_id, |o| o.fail(note, now)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, cmd: CancelOrder) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(cmd.aggregate_id(), |o| {
            o.cancel(cmd.reason.clone(), cmd.cancelled_by, now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_shipment(
        &self,
        cmd: UpdateShipment,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.write(cmd.aggregate_id(), |o| {
            o.update_shipment(cmd.tracking_number.clone(), cmd.carrier.clone())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn request_return(
        &self,
        cmd: RequestReturn,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        let window = self.return_window_days;
        self.write(cmd.aggregate_id(), |o| {
            o.request_return(cmd.reason.clone(), now, window)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_return_status(
        &self,
        cmd: UpdateReturnStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(cmd.aggregate_id(), |o| {
            o.update_return_status(cmd.status, cmd.updated_by, now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_payment_success(
        &self,
        order_id: AggregateId,
        transaction_id: &str,
        provider: &str,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(order_id, |o| {
            o.record_payment_success(transaction_id, provider, now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_payment_failure(
        &self,
        order_id: AggregateId,
        reason: Option<String>,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(order_id, |o| o.record_payment_failure(reason.clone(), now))
            .await
    }

    /// Records that a refund was sent to the gateway. Fails with
    /// `RefundInProgress` while another refund is unsettled.
    #[tracing::instrument(skip(self))]
    pub async fn request_refund(
        &self,
        cmd: &RefundPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(cmd.aggregate_id(), |o| {
            o.request_refund(cmd.amount, cmd.reason.clone(), cmd.refunded_by, now)
        })
        .await
    }

    pub async fn fail_refund(
        &self,
        order_id: AggregateId,
        reason: &str,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(order_id, |o| o.fail_refund(reason, now)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        cmd: RefundPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        self.write(cmd.aggregate_id(), |o| {
            o.refund(
                cmd.amount,
                cmd.reason.clone(),
                cmd.refund_id.clone(),
                cmd.refunded_by,
                now,
            )
        })
        .await
    }

    async fn write<F>(
        &self,
        order_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<Order>, DomainError>
    where
        F: Fn(&Order) -> Result<Vec<OrderEvent>, OrderError> + Send + Sync,
    {
        let result = self
            .handler
            .execute_with_retry(order_id, self.retry_attempts, command_fn)
            .await?;
        self.handler.save_snapshot_if_due(order_id, &result).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::UserId;
    use event_store::InMemoryEventStore;

    use super::*;
    use crate::aggregate::Aggregate;
    use crate::clock::ManualClock;
    use crate::money::Money;
    use crate::order::{
        Address, OrderItem, OrderPricing, OrderStatus, PaymentMethod, PaymentStatus,
        ReturnStatus, ShippingMethod,
    };

    fn address() -> Address {
        Address {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            address: "12 St James's Square".to_string(),
            apartment: None,
            city: "London".to_string(),
            state: "LDN".to_string(),
            country: "UK".to_string(),
            zip_code: "SW1Y".to_string(),
            phone: "555-0199".to_string(),
        }
    }

    fn new_order() -> NewOrder {
        let item = OrderItem::new(AggregateId::new(), "Lamp", "LAMP-1", 1, Money::from_dollars(30));
        NewOrder {
            user_id: UserId::new(),
            pricing: OrderPricing {
                subtotal: item.total,
                total: item.total,
                ..OrderPricing::default()
            },
            items: vec![item],
            coupon_code: Some("SPRING".to_string()),
            shipping_address: address(),
            billing_address: None,
            payment_method: PaymentMethod::Card,
            shipping_method: ShippingMethod::Standard,
            customer_note: None,
        }
    }

    fn service(clock: Arc<ManualClock>) -> OrderService<InMemoryEventStore> {
        OrderService::new(InMemoryEventStore::new(), clock)
    }

    #[tokio::test]
    async fn placed_order_is_found_by_number() {
        let service = service(Arc::new(ManualClock::default()));
        let placed = service.place_order(new_order()).await.unwrap();
        let number = placed.aggregate.order_number().to_string();

        assert!(number.starts_with("ORD-"));
        let found = service.get_by_number(&number).await.unwrap().unwrap();
        assert_eq!(found.id(), placed.aggregate.id());
        assert_eq!(found.coupon_code(), Some("SPRING"));
    }

    #[tokio::test]
    async fn every_placement_gets_its_own_number() {
        let service = service(Arc::new(ManualClock::default()));
        let first = service.place_order(new_order()).await.unwrap();
        let second = service.place_order(new_order()).await.unwrap();
        assert_ne!(first.aggregate.id(), second.aggregate.id());
    }

    #[tokio::test]
    async fn return_after_window_is_refused() {
        let clock = Arc::new(ManualClock::default());
        let service = service(Arc::clone(&clock));
        let id = service
            .place_order(new_order())
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        service
            .record_payment_success(id, "pi_9", "stripe")
            .await
            .unwrap();
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            service
                .change_status(ChangeOrderStatus::new(id, status))
                .await
                .unwrap();
        }

        clock.advance(Duration::days(31));
        let err = service
            .request_return(RequestReturn::new(id, "Wrong colour"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "return_window_expired");

        let order = service.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.return_request().status, ReturnStatus::None);
    }

    #[tokio::test]
    async fn refund_marks_order_refunded() {
        let service = service(Arc::new(ManualClock::default()));
        let id = service
            .place_order(new_order())
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        service
            .record_payment_success(id, "pi_3", "stripe")
            .await
            .unwrap();

        let refunded = service
            .refund_payment(RefundPayment::full(id, "Customer request").with_refund_id("re_3"))
            .await
            .unwrap()
            .aggregate;

        assert_eq!(refunded.payment_status(), PaymentStatus::Refunded);
        assert_eq!(refunded.status(), OrderStatus::Refunded);
        assert_eq!(refunded.refund_details().unwrap().refund_id.as_deref(), Some("re_3"));
    }

    #[tokio::test]
    async fn only_one_writer_claims_a_hold() {
        let service = service(Arc::new(ManualClock::default()));
        let id = service
            .place_order(new_order())
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        service
            .set_inventory_hold(id, InventoryHold::Reserved)
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            service.claim_hold(id, InventoryHold::Reserved, InventoryHold::Committed),
            service.claim_hold(id, InventoryHold::Reserved, InventoryHold::Committed),
        );
        let won = [first.unwrap(), second.unwrap()];
        assert_eq!(won.iter().filter(|claimed| **claimed).count(), 1);

        let order = service.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.inventory(), InventoryHold::Committed);
        assert!(!service
            .claim_hold(id, InventoryHold::Reserved, InventoryHold::Released)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn refund_request_blocks_a_second_refund() {
        let service = service(Arc::new(ManualClock::default()));
        let id = service
            .place_order(new_order())
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        service
            .record_payment_success(id, "pi_4", "stripe")
            .await
            .unwrap();

        let cmd = RefundPayment::full(id, "Damaged");
        service.request_refund(&cmd).await.unwrap();
        let err = service.request_refund(&cmd).await.unwrap_err();
        assert_eq!(err.code(), "refund_in_progress");

        service.fail_refund(id, "gateway down").await.unwrap();
        service.request_refund(&cmd).await.unwrap();
        let refunded = service.refund_payment(cmd).await.unwrap().aggregate;
        assert!(refunded.pending_refund().is_none());
        assert_eq!(refunded.payment_status(), PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_not_found() {
        let service = service(Arc::new(ManualClock::default()));
        let err = service
            .cancel_order(CancelOrder::new(AggregateId::new(), "nope"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "order_not_found");
    }
}
