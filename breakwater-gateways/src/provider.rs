//! Payment gateway trait and shared adapter plumbing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use breakwater_core::resilience::{CircuitBreaker, CircuitBreakerError};
use breakwater_core::{AuditLog, OrderStore, SecurityEvent, SecurityEventKind};

use crate::error::{GatewayError, GatewayResult};
use crate::types::{ChargeRequest, ChargeResponse, SplitRole, SplitRule};

/// Payment gateway trait
///
/// Implement this trait for each payment provider (MercadoPago, Asaas,
/// PushinPay). Object-safe so the factory can hand out trait objects.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider key, e.g. `"mercadopago"`
    fn name(&self) -> &'static str;

    /// Create a PIX charge for an order
    async fn create_pix_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResponse>;

    /// Create a card charge for an order
    async fn create_card_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResponse>;

    /// Probe the provider API with the configured credentials
    async fn validate_credentials(&self) -> bool;
}

impl std::fmt::Debug for dyn PaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateway")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Credential placement on the wire
#[derive(Debug, Clone, Copy)]
pub enum AuthStyle {
    /// `Authorization: Bearer {token}`
    Bearer,
    /// Named header carrying the raw token
    Header(&'static str),
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Common HTTP client for provider adapters.
///
/// Bounded connect and total timeouts on every call; the per-provider
/// circuit breaker sits above this and counts failures.
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    credential: SecretString,
    auth: AuthStyle,
}

impl GatewayClient {
    /// Create a new gateway client
    pub fn new(base_url: impl Into<String>, credential: SecretString, auth: AuthStyle) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            AuthStyle::Bearer => request.bearer_auth(self.credential.expose_secret()),
            AuthStyle::Header(name) => request.header(name, self.credential.expose_secret()),
        }
    }

    /// GET request
    pub async fn get(&self, path: &str) -> GatewayResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self.authed(self.client.get(&url)).send().await?)
    }

    /// POST request with JSON body
    pub async fn post<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> GatewayResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self.authed(self.client.post(&url)).json(body).send().await?)
    }

    /// POST request with JSON body plus one extra header (idempotency keys)
    pub async fn post_with_header<T: serde::Serialize>(
        &self,
        path: &str,
        header: (&str, &str),
        body: &T,
    ) -> GatewayResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .authed(self.client.post(&url))
            .header(header.0, header.1)
            .json(body)
            .send()
            .await?)
    }
}

/// Execute a provider call through its breaker.
///
/// Transport errors and 5xx responses count as breaker failures; 4xx
/// responses pass through, they are the provider answering, not an outage.
pub(crate) async fn guarded_call<F, Fut>(
    breaker: &CircuitBreaker,
    f: F,
) -> GatewayResult<reqwest::Response>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = GatewayResult<reqwest::Response>>,
{
    let result = breaker
        .call(|| async {
            let response = f().await?;
            if response.status().is_server_error() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Provider(format!("HTTP {status}: {body}")));
            }
            Ok(response)
        })
        .await;

    match result {
        Ok(response) => Ok(response),
        Err(CircuitBreakerError::Open) | Err(CircuitBreakerError::HalfOpenLimitReached) => {
            Err(GatewayError::CircuitOpen(breaker.name().to_string()))
        }
        Err(CircuitBreakerError::Execution(err)) => Err(err),
    }
}

/// Re-validate the requested amount against the stored order.
///
/// Runs before any network I/O. The request amount came through the caller;
/// the stored order amount is authoritative. A mismatch fails closed and
/// records a `value_mismatch` audit event.
pub(crate) async fn verify_order_amount(
    store: &dyn OrderStore,
    audit: &dyn AuditLog,
    provider: &'static str,
    request: &ChargeRequest,
) -> GatewayResult<()> {
    if request.amount.amount <= 0 {
        return Err(GatewayError::InvalidAmount(format!(
            "amount must be positive, got {}",
            request.amount.amount
        )));
    }

    let order = store
        .get(&request.order_id)
        .await?
        .ok_or_else(|| GatewayError::OrderNotFound(request.order_id.clone()))?;

    if order.amount != request.amount {
        audit.record(SecurityEvent::new(
            SecurityEventKind::ValueMismatch,
            provider,
            format!(
                "charge for order {} requested {} but stored amount is {}",
                request.order_id, request.amount, order.amount
            ),
        ));
        return Err(GatewayError::AmountMismatch {
            order_id: request.order_id.clone(),
            requested: request.amount,
            stored: order.amount,
        });
    }

    debug!(provider, order_id = %request.order_id, "Charge amount verified against order");
    Ok(())
}

/// Split rules an adapter should forward to the provider.
///
/// Producer portions are implicit (the credential owner keeps the
/// remainder) and are skipped. Rules without a recipient are dropped with a
/// warning, never folded into another recipient. The non-producer total
/// must fit inside the order amount.
pub(crate) fn usable_splits<'a>(
    provider: &str,
    request: &'a ChargeRequest,
) -> GatewayResult<Vec<&'a SplitRule>> {
    let mut usable = Vec::new();
    let mut total: i64 = 0;

    for rule in &request.split_rules {
        if rule.role == SplitRole::Producer {
            continue;
        }
        let Some(recipient) = rule.recipient_id.as_deref() else {
            warn!(
                provider,
                order_id = %request.order_id,
                role = ?rule.role,
                amount = rule.amount,
                "Split rule without recipient dropped"
            );
            continue;
        };
        debug!(provider, recipient, amount = rule.amount, "Split portion");
        total += rule.amount;
        usable.push(rule);
    }

    if total > request.amount.amount {
        return Err(GatewayError::InvalidSplit(format!(
            "split total {} exceeds order amount {}",
            total, request.amount.amount
        )));
    }

    Ok(usable)
}

/// Card charges need a tokenized card.
pub(crate) fn require_card_token(request: &ChargeRequest) -> GatewayResult<&str> {
    request
        .card_token
        .as_deref()
        .ok_or(GatewayError::MissingCardToken)
}

/// Amount in decimal currency units for providers that take `99.90`-style
/// amounts on the wire. PushinPay takes minor units directly and does not
/// go through this.
pub(crate) fn decimal_units(amount: breakwater_core::Money) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    amount.to_decimal().to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakwater_core::{Customer, MemoryAuditLog, MemoryOrderStore, Money, Order};
    use std::sync::Arc;

    fn request(amount: i64) -> ChargeRequest {
        ChargeRequest::new("order_1", Money::brl(amount), "Ana Souza", "ana@example.com")
    }

    async fn seeded_store(amount: i64) -> Arc<MemoryOrderStore> {
        let store = Arc::new(MemoryOrderStore::new());
        store
            .insert(Order::new(
                "order_1",
                "vendor_1",
                "product_1",
                Customer::new("Ana Souza", "ana@example.com"),
                Money::brl(amount),
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_amount_must_match_stored_order() {
        let store = seeded_store(9900).await;
        let audit = MemoryAuditLog::new();

        let ok = verify_order_amount(store.as_ref(), &audit, "mercadopago", &request(9900)).await;
        assert!(ok.is_ok());
        assert!(audit.is_empty());

        let tampered =
            verify_order_amount(store.as_ref(), &audit, "mercadopago", &request(100)).await;
        assert!(matches!(
            tampered.unwrap_err(),
            GatewayError::AmountMismatch { .. }
        ));
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amount() {
        let store = seeded_store(9900).await;
        let audit = MemoryAuditLog::new();

        let err = verify_order_amount(store.as_ref(), &audit, "asaas", &request(0))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_unknown_order_fails_closed() {
        let store = Arc::new(MemoryOrderStore::new());
        let audit = MemoryAuditLog::new();

        let err = verify_order_amount(store.as_ref(), &audit, "pushinpay", &request(9900))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::OrderNotFound(_)));
    }

    #[test]
    fn test_split_overspend_rejected() {
        let req = request(1000)
            .split(SplitRule::new(SplitRole::Affiliate, 700).recipient("wallet_a"))
            .split(SplitRule::new(SplitRole::Platform, 400).recipient("wallet_b"));

        let err = usable_splits("asaas", &req).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSplit(_)));
    }

    #[test]
    fn test_split_without_recipient_dropped() {
        let req = request(1000)
            .split(SplitRule::new(SplitRole::Affiliate, 300).recipient("wallet_a"))
            .split(SplitRule::new(SplitRole::Platform, 900));

        // The recipient-less platform rule is dropped, so the total fits.
        let usable = usable_splits("pushinpay", &req).unwrap();
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].recipient_id.as_deref(), Some("wallet_a"));
    }

    #[test]
    fn test_producer_rules_are_implicit() {
        let req = request(1000)
            .split(SplitRule::new(SplitRole::Producer, 700).recipient("producer_wallet"))
            .split(SplitRule::new(SplitRole::Affiliate, 300).recipient("wallet_a"));

        let usable = usable_splits("asaas", &req).unwrap();
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].role, SplitRole::Affiliate);
    }

    #[test]
    fn test_card_token_required() {
        assert!(matches!(
            require_card_token(&request(1000)),
            Err(GatewayError::MissingCardToken)
        ));
        assert_eq!(
            require_card_token(&request(1000).card_token("tok_abc")).unwrap(),
            "tok_abc"
        );
    }

    #[test]
    fn test_decimal_units_from_minor_units() {
        assert_eq!(decimal_units(Money::brl(9990)), 99.90);
        assert_eq!(decimal_units(Money::brl(100)), 1.0);
        assert_eq!(decimal_units(Money::brl(1)), 0.01);
    }
}
