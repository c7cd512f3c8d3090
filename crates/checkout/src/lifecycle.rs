//! Order lifecycle: checkout, cancellation, returns and operator updates.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use common::{AggregateId, Caller, UserId};
use domain::order::{
    CancelOrder, ChangeOrderStatus, RequestReturn, UpdateReturnStatus, UpdateShipment,
    order_id_for,
};
use domain::{
    Address, Cart, DomainError, InventoryHold, Money, NewOrder, Order, OrderItem, OrderStatus,
    PaymentMethod, Product, ReturnStatus, ShippingMethod,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::context::DomainServices;
use crate::error::{CheckoutError, Result};
use crate::policy::CheckoutPolicy;
use crate::services::{Notification, Notifier, PaymentGateway};
use crate::steps::{
    StockLine, deduct_all, ensure_in_stock, release_all, reserve_all, restore_all, revert_all,
    stock_lines,
};

/// Shipping and payment choices made at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub shipping_method: ShippingMethod,
    #[serde(default)]
    pub customer_note: Option<String>,
}

/// Operator status write with optional shipment details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            note: None,
            tracking_number: None,
            carrier: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_tracking(
        mut self,
        tracking_number: impl Into<String>,
        carrier: impl Into<String>,
    ) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self.carrier = Some(carrier.into());
        self
    }
}

/// Steps of a checkout that have to be undone if a later one fails.
#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    reserved: bool,
    hold_recorded: bool,
    coupon_recorded: bool,
}

/// Attempts to settle an order's stock against a hold other writers keep moving.
const HOLD_CLAIM_ATTEMPTS: usize = 4;

/// Drives orders through their lifecycle across the product, coupon, cart and
/// order aggregates.
///
/// Checkout runs as a saga:
/// 1. Validate the cart against live stock and the live coupon
/// 2. Place the order (`pending/pending`)
/// 3. Reserve stock for every line
/// 4. Record coupon usage
/// 5. Clear the cart
/// 6. Confirm immediately for cash on delivery
///
/// Validation failures write nothing. A failure after the order exists
/// releases what was reserved and marks the order failed.
pub struct OrderLifecycle<S, P, N>
where
    S: EventStore,
    P: PaymentGateway,
    N: Notifier,
{
    pub(crate) services: DomainServices<S>,
    pub(crate) gateway: P,
    pub(crate) notifier: N,
    pub(crate) policy: CheckoutPolicy,
}

impl<S, P, N> OrderLifecycle<S, P, N>
where
    S: EventStore,
    P: PaymentGateway,
    N: Notifier,
{
    pub fn new(services: DomainServices<S>, gateway: P, notifier: N) -> Self {
        Self {
            services,
            gateway,
            notifier,
            policy: CheckoutPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CheckoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn services(&self) -> &DomainServices<S> {
        &self.services
    }

    pub fn policy(&self) -> &CheckoutPolicy {
        &self.policy
    }

    /// Turns the caller's cart into an order.
    #[tracing::instrument(skip(self, request))]
    pub async fn checkout(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let started = Instant::now();
        let result = self.run_checkout(user_id, request).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_orders_placed_total").increment(1);
                tracing::info!(
                    order_number = order.order_number(),
                    total = %order.total(),
                    status = %order.status(),
                    "Checkout completed"
                );
            }
            Err(err) => {
                metrics::counter!("checkout_failures_total", "reason" => err.code()).increment(1);
                tracing::warn!(error = %err, code = err.code(), "Checkout failed");
            }
        }
        result
    }

    /// Loads an order for its owner or an admin.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, caller: Caller, order_id: AggregateId) -> Result<Order> {
        let order = self.load(order_id).await?;
        authorize_access(caller, &order)?;
        Ok(order)
    }

    /// Owner cancellation.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        caller: Caller,
        order_id: AggregateId,
        reason: &str,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        authorize_owner(caller, &order)?;
        self.cancel(order_id, reason, Some(caller.user_id)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn request_return(
        &self,
        caller: Caller,
        order_id: AggregateId,
        reason: &str,
    ) -> Result<Order> {
        let order = self.load(order_id).await?;
        authorize_owner(caller, &order)?;
        let result = self
            .services
            .orders
            .request_return(RequestReturn::new(order_id, reason))
            .await?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_return_status(
        &self,
        caller: Caller,
        order_id: AggregateId,
        status: ReturnStatus,
    ) -> Result<Order> {
        if !caller.is_operator() {
            return Err(CheckoutError::Forbidden);
        }
        self.load(order_id).await?;
        let result = self
            .services
            .orders
            .update_return_status(UpdateReturnStatus::new(order_id, status).by(caller.user_id))
            .await?;
        Ok(result.aggregate)
    }

    /// Operator status write.
    ///
    /// Moving a reserved order into fulfilment claims the hold and deducts its
    /// stock first; the deduction is reverted if the status write is refused.
    /// A `cancelled` target runs the cancellation protocol.
    #[tracing::instrument(skip(self, update), fields(status = %update.status))]
    pub async fn update_status(
        &self,
        caller: Caller,
        order_id: AggregateId,
        update: StatusUpdate,
    ) -> Result<Order> {
        if !caller.is_operator() {
            return Err(CheckoutError::Forbidden);
        }
        let order = self.load(order_id).await?;

        if update.status == OrderStatus::Cancelled {
            let reason = update
                .note
                .clone()
                .unwrap_or_else(|| "Cancelled by staff".to_string());
            return self.cancel(order_id, &reason, Some(caller.user_id)).await;
        }

        let now = self.services.clock.now();
        order
            .change_status(update.status, None, None, now)
            .map_err(DomainError::from)?;

        let lines = stock_lines(order.items());
        let committed = if order.inventory() == InventoryHold::Reserved
            && is_fulfilment(update.status)
        {
            self.commit_hold(order_id, &lines).await?
        } else {
            false
        };

        let mut cmd = ChangeOrderStatus::new(order_id, update.status).by(caller.user_id);
        cmd.note = update.note.clone();
        if let Err(err) = self.services.orders.change_status(cmd).await {
            if committed {
                self.undo_commit(order_id, &lines).await;
            }
            return Err(err.into());
        }

        if update.status == OrderStatus::Failed && order.inventory() == InventoryHold::Reserved {
            self.release_hold(order_id, &lines).await?;
        }

        if update.tracking_number.is_some() || update.carrier.is_some() {
            self.services
                .orders
                .update_shipment(UpdateShipment {
                    order_id,
                    tracking_number: update.tracking_number.clone(),
                    carrier: update.carrier.clone(),
                })
                .await?;
        }

        let updated = self.load(order_id).await?;
        tracing::info!(
            order_number = updated.order_number(),
            from = %order.status(),
            to = %updated.status(),
            "Order status updated"
        );
        self.notify_status(&updated).await;
        Ok(updated)
    }

    async fn run_checkout(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let cart = self.services.carts.get_cart(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let items = self.snapshot_items(&cart).await?;
        let subtotal = cart.subtotal();
        let now = self.services.clock.now();

        let (coupon_code, discount) = match cart.coupon() {
            Some(applied) => {
                let coupon = self
                    .services
                    .coupons
                    .get_by_code(&applied.code)
                    .await?
                    .ok_or_else(|| CheckoutError::CouponNotFound(applied.code.clone()))?;
                coupon
                    .eligibility(user_id, now, Some(subtotal))
                    .map_err(CheckoutError::CouponIneligible)?;
                (
                    Some(coupon.code().to_string()),
                    coupon.calculate_discount(subtotal),
                )
            }
            None => (None, Money::zero()),
        };

        let payment_method = request.payment_method;
        let pricing = self
            .policy
            .pricing
            .quote(subtotal, discount, request.shipping_method);
        let placed = self
            .services
            .orders
            .place_order(NewOrder {
                user_id,
                items,
                pricing,
                coupon_code: coupon_code.clone(),
                shipping_address: request.shipping_address,
                billing_address: request.billing_address,
                payment_method,
                shipping_method: request.shipping_method,
                customer_note: request.customer_note,
            })
            .await?
            .aggregate;
        let order_id = order_id_for(placed.order_number());
        let lines = stock_lines(placed.items());

        let mut progress = Progress::default();
        let order = match self
            .complete_placement(
                order_id,
                user_id,
                &lines,
                coupon_code.as_deref(),
                payment_method,
                &mut progress,
            )
            .await
        {
            Ok(order) => order,
            Err(err) => {
                self.compensate(
                    order_id,
                    user_id,
                    &lines,
                    coupon_code.as_deref(),
                    progress,
                    &err,
                )
                .await;
                return Err(err);
            }
        };

        if let Some(user_id) = order.user_id() {
            self.notify(Notification::OrderConfirmation {
                user_id,
                order_number: order.order_number().to_string(),
                total: order.total(),
            })
            .await;
        }
        Ok(order)
    }

    async fn complete_placement(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        lines: &[StockLine],
        coupon_code: Option<&str>,
        payment_method: PaymentMethod,
        progress: &mut Progress,
    ) -> Result<Order> {
        reserve_all(&self.services.products, lines).await?;
        progress.reserved = true;
        self.services
            .orders
            .set_inventory_hold(order_id, InventoryHold::Reserved)
            .await?;
        progress.hold_recorded = true;

        if let Some(code) = coupon_code {
            self.services.coupons.record_usage(code, user_id).await?;
            progress.coupon_recorded = true;
        }

        if let Err(err) = self.services.carts.clear_cart(user_id).await {
            tracing::warn!(%user_id, error = %err, "Failed to clear cart after checkout");
        }

        if payment_method == PaymentMethod::Cod {
            return self
                .commit_reserved(order_id, lines, "Cash on delivery")
                .await;
        }
        self.load(order_id).await
    }

    /// Confirms a pending order whose stock is reserved, deducting the stock.
    /// Leaves the reservation in place if confirmation is refused.
    async fn commit_reserved(
        &self,
        order_id: AggregateId,
        lines: &[StockLine],
        note: &str,
    ) -> Result<Order> {
        let committed = self.commit_hold(order_id, lines).await?;
        let cmd = ChangeOrderStatus::new(order_id, OrderStatus::Confirmed).with_note(note);
        match self.services.orders.change_status(cmd).await {
            Ok(result) => Ok(result.aggregate),
            Err(err) => {
                if committed {
                    self.undo_commit(order_id, lines).await;
                }
                Err(err.into())
            }
        }
    }

    /// Claims `Reserved -> Committed` and deducts the stock if the claim won.
    ///
    /// Returns `false` without touching stock when another writer already
    /// moved the hold. A failed deduction hands the hold back.
    pub(crate) async fn commit_hold(
        &self,
        order_id: AggregateId,
        lines: &[StockLine],
    ) -> Result<bool> {
        let claimed = self
            .services
            .orders
            .claim_hold(order_id, InventoryHold::Reserved, InventoryHold::Committed)
            .await?;
        if !claimed {
            return Ok(false);
        }
        if let Err(err) = deduct_all(&self.services.products, lines).await {
            self.reopen_hold(order_id).await;
            return Err(err.into());
        }
        Ok(true)
    }

    /// Moves a committed hold back to reserved after a refused order write.
    /// Stock is only reverted if this writer still owned the hold.
    pub(crate) async fn undo_commit(&self, order_id: AggregateId, lines: &[StockLine]) {
        if self.reopen_hold(order_id).await {
            revert_all(&self.services.products, lines).await;
        }
    }

    async fn reopen_hold(&self, order_id: AggregateId) -> bool {
        match self
            .services
            .orders
            .claim_hold(order_id, InventoryHold::Committed, InventoryHold::Reserved)
            .await
        {
            Ok(reopened) => reopened,
            Err(err) => {
                tracing::error!(%order_id, error = %err, "Failed to reopen inventory hold");
                false
            }
        }
    }

    /// Claims `Reserved -> Released` and releases the reservation if the claim
    /// won.
    pub(crate) async fn release_hold(
        &self,
        order_id: AggregateId,
        lines: &[StockLine],
    ) -> Result<bool> {
        let claimed = self
            .services
            .orders
            .claim_hold(order_id, InventoryHold::Reserved, InventoryHold::Released)
            .await?;
        if claimed {
            release_all(&self.services.products, lines).await;
        }
        Ok(claimed)
    }

    /// Gives back whatever stock the order still holds: reservations are
    /// released, deductions restored. Follows the hold if another writer
    /// moves it between reads.
    async fn settle_hold(&self, order_id: AggregateId, order: Order) -> Result<Order> {
        let lines = stock_lines(order.items());
        let mut current = order;
        for _ in 0..HOLD_CLAIM_ATTEMPTS {
            let hold = current.inventory();
            if matches!(hold, InventoryHold::None | InventoryHold::Released) {
                return Ok(current);
            }
            if self
                .services
                .orders
                .claim_hold(order_id, hold, InventoryHold::Released)
                .await?
            {
                if hold == InventoryHold::Committed {
                    restore_all(&self.services.products, &lines).await;
                } else {
                    release_all(&self.services.products, &lines).await;
                }
                return self.load(order_id).await;
            }
            current = self.load(order_id).await?;
        }
        tracing::warn!(
            %order_id,
            hold = ?current.inventory(),
            "Inventory hold kept moving, leaving stock as is"
        );
        Ok(current)
    }

    async fn compensate(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        lines: &[StockLine],
        coupon_code: Option<&str>,
        progress: Progress,
        cause: &CheckoutError,
    ) {
        metrics::counter!("checkout_compensations_total", "step" => "checkout").increment(1);
        tracing::warn!(%order_id, error = %cause, "Compensating failed checkout");

        if progress.hold_recorded {
            if let Err(err) = self.release_hold(order_id, lines).await {
                tracing::error!(%order_id, error = %err, "Failed to release held stock");
            }
        } else if progress.reserved {
            release_all(&self.services.products, lines).await;
            if let Err(err) = self
                .services
                .orders
                .set_inventory_hold(order_id, InventoryHold::Released)
                .await
            {
                tracing::error!(%order_id, error = %err, "Failed to record released hold");
            }
        }
        if let Some(code) = coupon_code
            && progress.coupon_recorded
            && self.policy.coupon_usage.reverts_on_failure()
        {
            self.revert_coupon(code, user_id).await;
        }
        if let Err(err) = self
            .services
            .orders
            .fail_order(order_id, &format!("Checkout failed: {}", cause.code()))
            .await
        {
            tracing::error!(%order_id, error = %err, "Failed to mark order failed");
        }
    }

    /// Copies each cart line into an order item after checking that every
    /// product can cover the units requested across all its variants.
    async fn snapshot_items(&self, cart: &Cart) -> Result<Vec<OrderItem>> {
        let mut requested: BTreeMap<AggregateId, u32> = BTreeMap::new();
        for line in cart.items() {
            let total = requested.entry(line.product_id).or_default();
            *total = total.saturating_add(line.quantity);
        }

        let mut products: HashMap<AggregateId, Product> = HashMap::new();
        for (&product_id, &quantity) in &requested {
            let product = self
                .services
                .products
                .get_product(product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(product_id))?;
            if !product.is_purchasable() {
                return Err(CheckoutError::ProductUnavailable(product_id));
            }
            ensure_in_stock(&product, product_id, quantity)?;
            products.insert(product_id, product);
        }

        cart.items()
            .iter()
            .map(|line| -> Result<OrderItem> {
                let product = products
                    .get(&line.product_id)
                    .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
                Ok(OrderItem::new(
                    line.product_id,
                    product.name(),
                    product.sku(),
                    line.quantity,
                    line.price,
                )
                .with_image(product.image().map(str::to_string))
                .with_variant(line.variant.clone()))
            })
            .collect()
    }

    pub(crate) async fn cancel(
        &self,
        order_id: AggregateId,
        reason: &str,
        cancelled_by: Option<UserId>,
    ) -> Result<Order> {
        let cancelled = self
            .services
            .orders
            .cancel_order(CancelOrder {
                order_id,
                reason: reason.to_string(),
                cancelled_by,
            })
            .await?
            .aggregate;

        let cancelled = self.settle_hold(order_id, cancelled).await?;

        if let (Some(code), Some(owner)) = (cancelled.coupon_code(), cancelled.user_id())
            && self.policy.coupon_usage.reverts_on_failure()
        {
            self.revert_coupon(code, owner).await;
        }

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_number = cancelled.order_number(), reason, "Order cancelled");
        if let Some(user_id) = cancelled.user_id() {
            self.notify(Notification::OrderCancelled {
                user_id,
                order_number: cancelled.order_number().to_string(),
                reason: reason.to_string(),
            })
            .await;
        }
        Ok(cancelled)
    }

    pub(crate) async fn revert_coupon(&self, code: &str, user_id: UserId) {
        if let Err(err) = self.services.coupons.revert_usage(code, user_id).await {
            tracing::error!(%code, %user_id, error = %err, "Failed to revert coupon usage");
        }
    }

    pub(crate) async fn load(&self, order_id: AggregateId) -> Result<Order> {
        self.services
            .orders
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }

    pub(crate) async fn notify_status(&self, order: &Order) {
        let Some(user_id) = order.user_id() else {
            return;
        };
        self.notify(Notification::OrderStatusUpdated {
            user_id,
            order_number: order.order_number().to_string(),
            status: order.status(),
        })
        .await;
        if order.status() == OrderStatus::Shipped {
            self.notify(Notification::OrderShipped {
                user_id,
                order_number: order.order_number().to_string(),
                phone: order.shipping_address().phone.clone(),
                tracking_number: order.tracking_number().map(str::to_string),
            })
            .await;
        }
    }

    /// Delivery failures are logged and counted, never returned.
    pub(crate) async fn notify(&self, notification: Notification) {
        let kind = notification.kind();
        if let Err(err) = self.notifier.notify(notification).await {
            metrics::counter!("notifications_failed_total", "kind" => kind).increment(1);
            tracing::warn!(kind, error = %err, "Notification failed");
        }
    }
}

/// Statuses that turn a live reservation into a real deduction. `Processing`
/// keeps the reservation so a cancellation can still release it.
fn is_fulfilment(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Confirmed | OrderStatus::Shipped | OrderStatus::Delivered
    )
}

pub(crate) fn authorize_access(caller: Caller, order: &Order) -> Result<()> {
    match order.user_id() {
        Some(owner) if caller.can_access(owner) => Ok(()),
        _ => Err(CheckoutError::Forbidden),
    }
}

pub(crate) fn authorize_owner(caller: Caller, order: &Order) -> Result<()> {
    if order.is_owned_by(caller.user_id) {
        Ok(())
    } else {
        Err(CheckoutError::Forbidden)
    }
}
