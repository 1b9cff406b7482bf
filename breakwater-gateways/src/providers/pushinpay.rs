//! PushinPay payment adapter
//!
//! PushinPay is PIX-only. Charges go through `POST /api/pix/cashIn` with
//! the amount in **cents** (unlike MercadoPago and Asaas, no decimal
//! conversion) and an optional `webhook_url` the provider notifies on
//! payment. Split portions ride as `split_rules` keyed by account id.
//!
//! Payment ids come back uppercase-UUID-ish; they are normalized to
//! lowercase here so webhook lookups match regardless of casing.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use breakwater_core::resilience::{BreakerRegistry, CircuitBreaker};
use breakwater_core::{AuditLog, OrderStore};

use crate::credentials::Environment;
use crate::error::{GatewayError, GatewayResult};
use crate::provider::{
    AuthStyle, GatewayClient, PaymentGateway, guarded_call, usable_splits, verify_order_amount,
};
use crate::types::{ChargeRequest, ChargeResponse, GatewayPaymentStatus};

const PRODUCTION_URL: &str = "https://api.pushinpay.com.br";
const SANDBOX_URL: &str = "https://api-sandbox.pushinpay.com.br";
const BREAKER_NAME: &str = "pushinpay-api";
const CASH_IN_PATH: &str = "/api/pix/cashIn";

/// PushinPay gateway adapter
pub struct PushinPayGateway {
    client: GatewayClient,
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditLog>,
    breaker: Arc<CircuitBreaker>,
    webhook_url: Option<String>,
}

impl PushinPayGateway {
    /// Create an adapter for the given environment
    pub fn new(
        token: SecretString,
        environment: Environment,
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditLog>,
        breakers: &BreakerRegistry,
    ) -> Self {
        let base_url = match environment {
            Environment::Sandbox => SANDBOX_URL,
            Environment::Production => PRODUCTION_URL,
        };
        Self::with_base_url(base_url, token, store, audit, breakers)
    }

    /// Create an adapter against a custom base URL. Tests point this at a
    /// mock server.
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: SecretString,
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditLog>,
        breakers: &BreakerRegistry,
    ) -> Self {
        Self {
            client: GatewayClient::new(base_url, token, AuthStyle::Bearer),
            store,
            audit,
            breaker: breakers.get_or_create(BREAKER_NAME),
            webhook_url: None,
        }
    }

    /// URL PushinPay should call when the PIX is paid or expires
    pub fn webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}

#[async_trait]
impl PaymentGateway for PushinPayGateway {
    fn name(&self) -> &'static str {
        "pushinpay"
    }

    async fn create_pix_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResponse> {
        verify_order_amount(self.store.as_ref(), self.audit.as_ref(), "pushinpay", request)
            .await?;

        let split_rules: Vec<PushinPaySplitRule> = usable_splits("pushinpay", request)?
            .into_iter()
            .map(|rule| PushinPaySplitRule {
                value: rule.amount,
                account_id: rule.recipient_id.clone().unwrap_or_default(),
            })
            .collect();

        let body = PushinPayCashInBody {
            value: request.amount.amount,
            webhook_url: self.webhook_url.clone(),
            split_rules: (!split_rules.is_empty()).then_some(split_rules),
        };

        info!(order_id = %request.order_id, "Creating PushinPay PIX charge");
        let result = guarded_call(&self.breaker, || self.client.post(CASH_IN_PATH, &body)).await;

        let response = match result {
            Ok(response) => response,
            Err(GatewayError::CircuitOpen(_)) => {
                warn!(order_id = %request.order_id, "PushinPay circuit open, refusing charge locally");
                return Ok(ChargeResponse::unavailable("pushinpay"));
            }
            Err(err) => return Err(err),
        };

        let http_status = response.status();
        let raw: serde_json::Value = response.json().await?;

        if !http_status.is_success() {
            let api_error: PushinPayApiError =
                serde_json::from_value(raw.clone()).unwrap_or_default();
            let message = api_error
                .message
                .unwrap_or_else(|| format!("HTTP {http_status}"));
            warn!(
                order_id = %request.order_id,
                status = %http_status,
                message,
                "PushinPay refused the charge"
            );
            return Ok(ChargeResponse::failure(GatewayPaymentStatus::Error, message).with_raw(raw));
        }

        let pix: PushinPayPix = serde_json::from_value(raw.clone())?;
        let status = pix.status.as_deref().unwrap_or("created");
        debug!(
            order_id = %request.order_id,
            pix_id = %pix.id,
            status,
            "PushinPay PIX created"
        );

        let mut charge = ChargeResponse::success(pix.id.to_lowercase(), map_status(status));
        if let Some(code) = pix.qr_code.as_deref() {
            charge = charge.with_qr(code, pix.qr_code_base64.clone());
        }

        Ok(charge.with_raw(raw))
    }

    async fn create_card_charge(&self, _request: &ChargeRequest) -> GatewayResult<ChargeResponse> {
        Err(GatewayError::Unsupported {
            provider: "pushinpay",
            operation: "card charges",
        })
    }

    async fn validate_credentials(&self) -> bool {
        // PushinPay has no dedicated credential endpoint. An authorized GET
        // against the cashIn route answers 405 for a good token and 401/403
        // for a bad one.
        match self.client.get(CASH_IN_PATH).await {
            Ok(response) => {
                let status = response.status();
                status != reqwest::StatusCode::UNAUTHORIZED
                    && status != reqwest::StatusCode::FORBIDDEN
            }
            Err(err) => {
                warn!(error = %err, "PushinPay credential check failed");
                false
            }
        }
    }
}

fn map_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "paid" | "approved" => GatewayPaymentStatus::Approved,
        "created" | "pending" => GatewayPaymentStatus::Pending,
        _ => GatewayPaymentStatus::Error,
    }
}

#[derive(Debug, Serialize)]
struct PushinPayCashInBody {
    /// Amount in cents, passed through without decimal conversion
    value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    split_rules: Option<Vec<PushinPaySplitRule>>,
}

#[derive(Debug, Serialize)]
struct PushinPaySplitRule {
    value: i64,
    account_id: String,
}

#[derive(Debug, Deserialize)]
struct PushinPayPix {
    id: String,
    #[serde(default)]
    qr_code: Option<String>,
    #[serde(default)]
    qr_code_base64: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PushinPayApiError {
    message: Option<String>,
}
