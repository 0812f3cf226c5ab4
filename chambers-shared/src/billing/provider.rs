/// Billing provider collaborator
///
/// The payment provider's checkout and portal mechanics live outside this
/// system; this module defines the narrow contract the entitlement core
/// needs from it (subscription creation, plan changes, cancellation) plus
/// the inbound webhook payload that drives the subscription state machine.
///
/// Outbound calls carry a bounded timeout and an idempotency key, since a
/// retried plan change must not double-charge or double-apply.
///
/// # Example
///
/// ```no_run
/// use chambers_shared::billing::provider::{BillingProvider, HttpBillingProvider};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = HttpBillingProvider::new(
///     "https://billing.example.com".to_string(),
///     "secret-api-key".to_string(),
/// )?;
///
/// let sub_ref = provider
///     .create_subscription("cus_123", Uuid::new_v4(), &Uuid::new_v4().to_string())
///     .await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::billing::state::SubscriptionEvent;

/// Timeout for calls to the billing provider
///
/// Plan changes run inside request handling; a hung provider must not hang
/// the request indefinitely.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for billing provider calls
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure (timeout, connection refused)
    #[error("Billing provider unreachable: {0}")]
    Transport(String),

    /// The provider rejected the request
    #[error("Billing provider rejected request: {status} {body}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Malformed provider response
    #[error("Invalid billing provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// How a plan change should take effect on the provider side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChangeTiming {
    /// Prorate and charge now
    Immediate,

    /// Swap at the end of the current period
    Deferred,
}

/// Contract with the payment provider
///
/// Only the operations the entitlement core initiates; everything the
/// provider initiates arrives as a [`WebhookPayload`].
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Creates a subscription for a customer, returning the provider's ref
    async fn create_subscription(
        &self,
        customer_ref: &str,
        plan_id: Uuid,
        idempotency_key: &str,
    ) -> Result<String, ProviderError>;

    /// Changes the plan of an existing subscription
    async fn change_plan(
        &self,
        subscription_ref: &str,
        plan_id: Uuid,
        timing: ProviderChangeTiming,
        idempotency_key: &str,
    ) -> Result<(), ProviderError>;

    /// Cancels a subscription
    async fn cancel_subscription(&self, subscription_ref: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Deserialize)]
struct CreateSubscriptionResponse {
    subscription_ref: String,
}

/// HTTP implementation of the provider contract
///
/// Every request carries an `Idempotency-Key` header and the client-wide
/// timeout, so a retry after a network failure is safe.
pub struct HttpBillingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBillingProvider {
    /// Creates a provider client
    pub fn new(base_url: String, api_key: String) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;

        Ok(HttpBillingProvider {
            client,
            base_url,
            api_key,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl BillingProvider for HttpBillingProvider {
    async fn create_subscription(
        &self,
        customer_ref: &str,
        plan_id: Uuid,
        idempotency_key: &str,
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/subscriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&serde_json::json!({
                "customer": customer_ref,
                "plan": plan_id,
            }))
            .send()
            .await?;

        let response = Self::check(response).await?;
        let body: CreateSubscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(body.subscription_ref)
    }

    async fn change_plan(
        &self,
        subscription_ref: &str,
        plan_id: Uuid,
        timing: ProviderChangeTiming,
        idempotency_key: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/subscriptions/{}/plan",
                self.base_url, subscription_ref
            ))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&serde_json::json!({
                "plan": plan_id,
                "timing": timing,
            }))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn cancel_subscription(&self, subscription_ref: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(format!(
                "{}/v1/subscriptions/{}",
                self.base_url, subscription_ref
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

/// Recording mock provider for tests
#[derive(Default)]
pub struct MockBillingProvider {
    calls: std::sync::Mutex<Vec<String>>,
}

impl MockBillingProvider {
    /// Creates an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls recorded so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock provider lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("mock provider lock").push(call);
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_subscription(
        &self,
        customer_ref: &str,
        plan_id: Uuid,
        idempotency_key: &str,
    ) -> Result<String, ProviderError> {
        self.record(format!("create:{customer_ref}:{plan_id}:{idempotency_key}"));
        Ok(format!("sub_{customer_ref}"))
    }

    async fn change_plan(
        &self,
        subscription_ref: &str,
        plan_id: Uuid,
        timing: ProviderChangeTiming,
        idempotency_key: &str,
    ) -> Result<(), ProviderError> {
        self.record(format!(
            "change:{subscription_ref}:{plan_id}:{timing:?}:{idempotency_key}"
        ));
        Ok(())
    }

    async fn cancel_subscription(&self, subscription_ref: &str) -> Result<(), ProviderError> {
        self.record(format!("cancel:{subscription_ref}"));
        Ok(())
    }
}

/// Inbound webhook event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    /// A charge succeeded
    #[serde(rename = "charge.succeeded")]
    ChargeSucceeded,

    /// A charge attempt failed
    #[serde(rename = "charge.failed")]
    ChargeFailed,

    /// The provider canceled the subscription (retry budget exhausted)
    #[serde(rename = "subscription.canceled")]
    SubscriptionCanceled,
}

/// Inbound webhook payload from the billing provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Event type
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,

    /// Firm the event applies to
    pub firm_id: Uuid,

    /// Provider's subscription reference
    pub subscription_ref: Option<String>,
}

impl WebhookPayload {
    /// Maps the webhook to a state machine event
    pub fn to_subscription_event(&self) -> SubscriptionEvent {
        match self.event_type {
            WebhookEventType::ChargeSucceeded => SubscriptionEvent::ChargeSucceeded,
            WebhookEventType::ChargeFailed => SubscriptionEvent::ChargeFailed,
            WebhookEventType::SubscriptionCanceled => SubscriptionEvent::ProviderCanceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_payload_parses() {
        let firm_id = Uuid::new_v4();
        let json = serde_json::json!({
            "type": "charge.failed",
            "firm_id": firm_id,
            "subscription_ref": "sub_42",
        });

        let payload: WebhookPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.event_type, WebhookEventType::ChargeFailed);
        assert_eq!(payload.firm_id, firm_id);
        assert_eq!(
            payload.to_subscription_event(),
            SubscriptionEvent::ChargeFailed
        );
    }

    #[test]
    fn test_webhook_event_mapping() {
        let make = |event_type| WebhookPayload {
            event_type,
            firm_id: Uuid::new_v4(),
            subscription_ref: None,
        };

        assert_eq!(
            make(WebhookEventType::ChargeSucceeded).to_subscription_event(),
            SubscriptionEvent::ChargeSucceeded
        );
        assert_eq!(
            make(WebhookEventType::SubscriptionCanceled).to_subscription_event(),
            SubscriptionEvent::ProviderCanceled
        );
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let json = serde_json::json!({
            "type": "invoice.created",
            "firm_id": Uuid::new_v4(),
        });
        assert!(serde_json::from_value::<WebhookPayload>(json).is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_records_calls() {
        let provider = MockBillingProvider::new();
        let plan = Uuid::new_v4();

        let sub_ref = provider
            .create_subscription("cus_1", plan, "key-1")
            .await
            .unwrap();
        assert_eq!(sub_ref, "sub_cus_1");

        provider
            .change_plan(&sub_ref, plan, ProviderChangeTiming::Deferred, "key-2")
            .await
            .unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("create:cus_1"));
        assert!(calls[1].contains("Deferred"));
    }
}
