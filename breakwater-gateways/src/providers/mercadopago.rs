//! MercadoPago payment adapter
//!
//! Charges go through `POST /v1/payments` with the order id doubling as the
//! idempotency key, so a retried request can never create a second payment.
//! Amounts are decimal on this API. Split portions ride along as
//! `disbursements` keyed by collector id.
//!
//! Webhook handlers also use [`MercadoPagoGateway::get_payment`] to read the
//! authoritative payment state after a notification, since MercadoPago
//! notifications only carry the payment id.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use breakwater_core::Money;
use breakwater_core::resilience::{BreakerRegistry, CircuitBreaker};
use breakwater_core::{AuditLog, OrderStore};

use crate::error::{GatewayError, GatewayResult};
use crate::provider::{
    AuthStyle, GatewayClient, PaymentGateway, decimal_units, guarded_call, require_card_token,
    usable_splits, verify_order_amount,
};
use crate::types::{ChargeRequest, ChargeResponse, GatewayPaymentStatus};

const PRODUCTION_URL: &str = "https://api.mercadopago.com";
const BREAKER_NAME: &str = "mercadopago-api";
const STATEMENT_DESCRIPTOR: &str = "BREAKWATER";

/// MercadoPago gateway adapter
pub struct MercadoPagoGateway {
    client: GatewayClient,
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditLog>,
    breaker: Arc<CircuitBreaker>,
    notification_url: Option<String>,
}

impl MercadoPagoGateway {
    /// Create an adapter against the production API
    pub fn new(
        access_token: SecretString,
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditLog>,
        breakers: &BreakerRegistry,
    ) -> Self {
        Self::with_base_url(PRODUCTION_URL, access_token, store, audit, breakers)
    }

    /// Create an adapter against a custom base URL. Tests point this at a
    /// mock server.
    pub fn with_base_url(
        base_url: impl Into<String>,
        access_token: SecretString,
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditLog>,
        breakers: &BreakerRegistry,
    ) -> Self {
        Self {
            client: GatewayClient::new(base_url, access_token, AuthStyle::Bearer),
            store,
            audit,
            breaker: breakers.get_or_create(BREAKER_NAME),
            notification_url: None,
        }
    }

    /// URL MercadoPago should notify when the payment changes state
    pub fn notification_url(mut self, url: impl Into<String>) -> Self {
        self.notification_url = Some(url.into());
        self
    }

    /// Fetch the full payment detail for a payment id.
    ///
    /// MercadoPago webhook notifications only carry the payment id; the
    /// handler calls this to read status, external reference and amount.
    pub async fn get_payment(&self, payment_id: &str) -> GatewayResult<MercadoPagoPayment> {
        let path = format!("/v1/payments/{payment_id}");
        let response = guarded_call(&self.breaker, || self.client.get(&path)).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "payment {payment_id} lookup failed: HTTP {status}: {body}"
            )));
        }

        Ok(response.json::<MercadoPagoPayment>().await?)
    }

    fn charge_body(&self, request: &ChargeRequest) -> GatewayResult<MercadoPagoChargeBody> {
        let disbursements: Vec<MercadoPagoDisbursement> = usable_splits("mercadopago", request)?
            .into_iter()
            .map(|rule| MercadoPagoDisbursement {
                amount: decimal_units(Money::new(rule.amount, request.amount.currency)),
                external_reference: rule.role.as_str().to_string(),
                collector_id: rule.recipient_id.clone().unwrap_or_default(),
            })
            .collect();

        Ok(MercadoPagoChargeBody {
            transaction_amount: decimal_units(request.amount),
            description: request.description.clone(),
            payment_method_id: None,
            token: None,
            installments: None,
            statement_descriptor: None,
            payer: build_payer(request),
            external_reference: request.order_id.clone(),
            notification_url: self.notification_url.clone(),
            disbursements: (!disbursements.is_empty()).then_some(disbursements),
        })
    }

    async fn send_charge(
        &self,
        request: &ChargeRequest,
        body: &MercadoPagoChargeBody,
    ) -> GatewayResult<ChargeResponse> {
        let result = guarded_call(&self.breaker, || {
            self.client.post_with_header(
                "/v1/payments",
                ("X-Idempotency-Key", &request.order_id),
                body,
            )
        })
        .await;

        let response = match result {
            Ok(response) => response,
            Err(GatewayError::CircuitOpen(_)) => {
                warn!(order_id = %request.order_id, "MercadoPago circuit open, refusing charge locally");
                return Ok(ChargeResponse::unavailable("mercadopago"));
            }
            Err(err) => return Err(err),
        };

        let http_status = response.status();
        let raw: serde_json::Value = response.json().await?;

        if !http_status.is_success() {
            let api_error: MercadoPagoApiError =
                serde_json::from_value(raw.clone()).unwrap_or_default();
            let message = api_error
                .message
                .unwrap_or_else(|| format!("HTTP {http_status}"));
            warn!(
                order_id = %request.order_id,
                status = %http_status,
                message,
                "MercadoPago refused the charge"
            );
            return Ok(ChargeResponse::failure(GatewayPaymentStatus::Error, message).with_raw(raw));
        }

        let payment: MercadoPagoPayment = serde_json::from_value(raw.clone())?;
        debug!(
            order_id = %request.order_id,
            payment_id = payment.id,
            status = %payment.status,
            "MercadoPago charge created"
        );

        let mut charge = ChargeResponse::success(payment.id.to_string(), map_status(&payment.status));
        if let Some(data) = payment
            .point_of_interaction
            .as_ref()
            .and_then(|poi| poi.transaction_data.as_ref())
            && let Some(code) = data.qr_code.as_deref()
        {
            charge = charge.with_qr(code, data.qr_code_base64.clone());
        }

        Ok(charge.with_raw(raw))
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    fn name(&self) -> &'static str {
        "mercadopago"
    }

    async fn create_pix_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResponse> {
        verify_order_amount(self.store.as_ref(), self.audit.as_ref(), "mercadopago", request)
            .await?;

        let mut body = self.charge_body(request)?;
        body.payment_method_id = Some("pix".to_string());

        info!(order_id = %request.order_id, "Creating MercadoPago PIX charge");
        self.send_charge(request, &body).await
    }

    async fn create_card_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResponse> {
        verify_order_amount(self.store.as_ref(), self.audit.as_ref(), "mercadopago", request)
            .await?;
        let token = require_card_token(request)?.to_string();

        let mut body = self.charge_body(request)?;
        body.token = Some(token);
        body.installments = Some(request.installments.unwrap_or(1));
        body.statement_descriptor = Some(STATEMENT_DESCRIPTOR.to_string());

        info!(order_id = %request.order_id, "Creating MercadoPago card charge");
        self.send_charge(request, &body).await
    }

    async fn validate_credentials(&self) -> bool {
        match self.client.get("/v1/payment_methods").await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!(error = %err, "MercadoPago credential check failed");
                false
            }
        }
    }
}

fn map_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "approved" => GatewayPaymentStatus::Approved,
        "pending" | "in_process" | "in_mediation" | "authorized" => GatewayPaymentStatus::Pending,
        "rejected" | "cancelled" => GatewayPaymentStatus::Refused,
        _ => GatewayPaymentStatus::Error,
    }
}

fn build_payer(request: &ChargeRequest) -> MercadoPagoPayer {
    let mut names = request.customer_name.trim().splitn(2, char::is_whitespace);
    let first_name = names.next().unwrap_or_default().to_string();
    // MercadoPago requires a last name; single-word names get a placeholder.
    let last_name = names
        .next()
        .map(|rest| rest.trim().to_string())
        .filter(|rest| !rest.is_empty())
        .unwrap_or_else(|| "Cliente".to_string());

    let digits: String = request
        .customer_document
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let doc_type = if digits.len() == 11 { "CPF" } else { "CNPJ" };

    MercadoPagoPayer {
        email: request.customer_email.clone(),
        first_name,
        last_name,
        identification: MercadoPagoIdentification {
            doc_type: doc_type.to_string(),
            number: digits,
        },
    }
}

/// Payment detail as returned by `POST /v1/payments` and
/// `GET /v1/payments/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct MercadoPagoPayment {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    #[serde(default)]
    pub date_approved: Option<DateTime<Utc>>,
    #[serde(default)]
    pub point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointOfInteraction {
    #[serde(default)]
    pub transaction_data: Option<TransactionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionData {
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub qr_code_base64: Option<String>,
}

#[derive(Debug, Serialize)]
struct MercadoPagoChargeBody {
    transaction_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_method_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    installments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    statement_descriptor: Option<String>,
    payer: MercadoPagoPayer,
    external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disbursements: Option<Vec<MercadoPagoDisbursement>>,
}

#[derive(Debug, Serialize)]
struct MercadoPagoPayer {
    email: String,
    first_name: String,
    last_name: String,
    identification: MercadoPagoIdentification,
}

#[derive(Debug, Serialize)]
struct MercadoPagoIdentification {
    #[serde(rename = "type")]
    doc_type: String,
    number: String,
}

#[derive(Debug, Serialize)]
struct MercadoPagoDisbursement {
    amount: f64,
    external_reference: String,
    collector_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct MercadoPagoApiError {
    message: Option<String>,
    #[allow(dead_code)]
    status: Option<i64>,
}
