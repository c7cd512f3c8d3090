//! Coupon service.

use std::sync::Arc;

use common::{AggregateId, UserId};
use event_store::EventStore;

use crate::clock::Clock;
use crate::command::{CommandHandler, CommandResult, DEFAULT_RETRY_ATTEMPTS};
use crate::error::DomainError;

use super::{Coupon, CouponError, NewCoupon};

/// Canonical form of a coupon code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Coupons are addressed by their code, so a code maps to exactly one stream.
pub fn coupon_id(code: &str) -> AggregateId {
    AggregateId::from_key("coupon", &normalize_code(code))
}

pub struct CouponService<S: EventStore> {
    handler: CommandHandler<S, Coupon>,
    clock: Arc<dyn Clock>,
    retry_attempts: u32,
}

impl<S: EventStore> CouponService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            clock,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[tracing::instrument(skip(self, coupon), fields(code = %coupon.code))]
    pub async fn create_coupon(
        &self,
        coupon: NewCoupon,
        created_by: Option<UserId>,
    ) -> Result<CommandResult<Coupon>, DomainError> {
        let id = coupon_id(&coupon.code);
        let now = self.clock.now();
        match self
            .handler
            .execute(id, |c| c.create(id, coupon, created_by, now))
            .await
        {
            // Lost a race against another creation of the same code.
            Err(err) if err.is_conflict() => Err(CouponError::AlreadyExists.into()),
            other => other,
        }
    }

    /// Looks a coupon up by code, case-insensitively.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, DomainError> {
        self.handler.load_existing(coupon_id(code)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_usage(
        &self,
        code: &str,
        user_id: UserId,
    ) -> Result<CommandResult<Coupon>, DomainError> {
        let clock = Arc::clone(&self.clock);
        self.handler
            .execute_with_retry(coupon_id(code), self.retry_attempts, move |c| {
                c.record_usage(user_id, clock.now())
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn revert_usage(
        &self,
        code: &str,
        user_id: UserId,
    ) -> Result<CommandResult<Coupon>, DomainError> {
        self.handler
            .execute_with_retry(coupon_id(code), self.retry_attempts, |c| {
                c.revert_usage(user_id)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, code: &str) -> Result<CommandResult<Coupon>, DomainError> {
        let now = self.clock.now();
        self.handler
            .execute_with_retry(coupon_id(code), self.retry_attempts, |c| c.deactivate(now))
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use event_store::InMemoryEventStore;

    use super::*;
    use crate::clock::ManualClock;
    use crate::coupon::{Discount, Ineligibility};
    use crate::money::Money;

    fn new_coupon(code: &str) -> NewCoupon {
        NewCoupon {
            code: code.to_string(),
            description: Some("Spring sale".to_string()),
            discount: Discount::Fixed {
                amount: Money::from_dollars(5),
            },
            minimum_purchase: Money::zero(),
            maximum_discount: None,
            usage_limit: None,
            usage_limit_per_user: 1,
            starts_at: Utc::now() - Duration::days(1),
            ends_at: Utc::now() + Duration::days(1),
        }
    }

    #[tokio::test]
    async fn codes_are_case_insensitive_and_unique() {
        let service = CouponService::new(InMemoryEventStore::new(), Arc::new(ManualClock::default()));
        service.create_coupon(new_coupon("spring"), None).await.unwrap();

        let found = service.get_by_code("SPRING").await.unwrap().unwrap();
        assert_eq!(found.code(), "SPRING");

        let err = service
            .create_coupon(new_coupon("Spring"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "coupon_exists");
    }

    #[tokio::test]
    async fn record_usage_on_unknown_code_fails() {
        let service = CouponService::new(InMemoryEventStore::new(), Arc::new(ManualClock::default()));
        let err = service
            .record_usage("NOPE", UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Coupon(CouponError::NotFound)));
    }

    #[tokio::test]
    async fn usage_respects_clock() {
        let clock = Arc::new(ManualClock::default());
        let service = CouponService::new(InMemoryEventStore::new(), clock.clone());
        service.create_coupon(new_coupon("late"), None).await.unwrap();

        clock.advance(Duration::days(2));
        let err = service
            .record_usage("late", UserId::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Coupon(CouponError::Ineligible(Ineligibility::Expired))
        ));
        assert_eq!(err.code(), "coupon_expired");
    }

    #[tokio::test]
    async fn revert_hands_usage_back() {
        let service = CouponService::new(InMemoryEventStore::new(), Arc::new(ManualClock::default()));
        let user = UserId::new();
        service.create_coupon(new_coupon("once"), None).await.unwrap();

        service.record_usage("once", user).await.unwrap();
        let coupon = service.revert_usage("once", user).await.unwrap().aggregate;
        assert_eq!(coupon.usage_count(), 0);

        service.record_usage("once", user).await.unwrap();
    }
}
