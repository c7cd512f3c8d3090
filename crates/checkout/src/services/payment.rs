//! Payment gateway trait and in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::Money;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors reported by a payment gateway client.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Payment intent {0} not found")]
    IntentNotFound(String),

    #[error("Payment gateway request failed: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Canceled,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Canceled => "canceled",
        }
    }
}

/// What the core asks the gateway to charge. Amounts travel in cents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntent {
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get("order_id").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub id: String,
    pub intent_id: String,
    pub amount_cents: i64,
}

/// A verified webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookData {
    pub object: PaymentIntent,
}

pub const INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const INTENT_FAILED: &str = "payment_intent.payment_failed";

/// Client for an external card processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name recorded as the payment provider on paid orders.
    fn provider(&self) -> &'static str;

    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    /// Refunds an intent, fully when `amount` is `None`.
    async fn refund(
        &self,
        intent_id: &str,
        amount: Option<Money>,
        reason: &str,
    ) -> Result<RefundReceipt, GatewayError>;

    /// Verifies the signature and parses the payload.
    fn verify_webhook(&self, payload: &[u8], signature: &str)
    -> Result<WebhookEvent, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, PaymentIntent>,
    refunds: Vec<RefundReceipt>,
    next_id: u32,
    fail_requests: bool,
}

/// In-memory gateway. Webhooks carry a hex HMAC-SHA256 of the body keyed by
/// the shared secret.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    secret: Arc<str>,
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::new("whsec_local")
    }
}

impl InMemoryPaymentGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
            state: Arc::default(),
        }
    }

    /// Makes every subsequent request fail as if the processor were down.
    pub fn set_fail_requests(&self, fail: bool) {
        self.write().fail_requests = fail;
    }

    /// Moves an intent to a new status, as the processor would after the
    /// customer completes or abandons payment.
    pub fn set_intent_status(&self, intent_id: &str, status: IntentStatus) -> bool {
        match self.write().intents.get_mut(intent_id) {
            Some(intent) => {
                intent.status = status;
                true
            }
            None => false,
        }
    }

    pub fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.read().intents.get(intent_id).cloned()
    }

    pub fn refunds(&self) -> Vec<RefundReceipt> {
        self.read().refunds.clone()
    }

    /// Builds a signed webhook body for the intent's current state.
    pub fn webhook_payload(&self, event_type: &str, intent_id: &str) -> Option<(Vec<u8>, String)> {
        let intent = self.intent(intent_id)?;
        let event = WebhookEvent {
            event_type: event_type.to_string(),
            data: WebhookData { object: intent },
        };
        let body = serde_json::to_vec(&event).ok()?;
        let signature = self.sign(&body).ok()?;
        Some((body, signature))
    }

    /// Hex HMAC-SHA256 of `body` under the webhook secret.
    pub fn sign(&self, body: &[u8]) -> Result<String, GatewayError> {
        let mut mac = self.mac()?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> Result<HmacSha256, GatewayError> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| GatewayError::Unavailable(e.to_string()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryGatewayState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryGatewayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    fn provider(&self) -> &'static str {
        "stripe"
    }

    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.write();
        if state.fail_requests {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }

        state.next_id += 1;
        let id = format!("pi_{:06}", state.next_id);
        let intent = PaymentIntent {
            client_secret: format!("{id}_secret"),
            id: id.clone(),
            amount_cents: request.amount_cents,
            currency: request.currency,
            status: IntentStatus::RequiresPaymentMethod,
            metadata: request.metadata,
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let state = self.read();
        if state.fail_requests {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        state
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))
    }

    async fn refund(
        &self,
        intent_id: &str,
        amount: Option<Money>,
        _reason: &str,
    ) -> Result<RefundReceipt, GatewayError> {
        let mut state = self.write();
        if state.fail_requests {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        let intent_amount = state
            .intents
            .get(intent_id)
            .map(|intent| intent.amount_cents)
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))?;

        state.next_id += 1;
        let receipt = RefundReceipt {
            id: format!("re_{:06}", state.next_id),
            intent_id: intent_id.to_string(),
            amount_cents: amount.map_or(intent_amount, |m| m.cents()),
        };
        state.refunds.push(receipt.clone());
        Ok(receipt)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatewayError> {
        let expected = hex::decode(signature.trim()).map_err(|_| GatewayError::InvalidSignature)?;
        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| GatewayError::InvalidSignature)?;
        serde_json::from_slice(payload).map_err(|e| GatewayError::InvalidPayload(e.to_string()))
    }
}
