//! Asaas payment adapter
//!
//! Asaas charges hang off a customer record, so a PIX charge is three
//! calls: find-or-create the customer by CPF/CNPJ, create the payment with
//! `billingType PIX`, then fetch the QR code for it. Card charges reuse the
//! same customer step with a tokenized card. Amounts are decimal; splits
//! ride as `split` entries keyed by wallet id, with the remainder staying
//! with the account owner.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use breakwater_core::Money;
use breakwater_core::resilience::{BreakerRegistry, CircuitBreaker};
use breakwater_core::{AuditLog, OrderStore};

use crate::credentials::Environment;
use crate::error::{GatewayError, GatewayResult};
use crate::provider::{
    AuthStyle, GatewayClient, PaymentGateway, decimal_units, guarded_call, require_card_token,
    usable_splits, verify_order_amount,
};
use crate::types::{ChargeRequest, ChargeResponse, GatewayPaymentStatus};

const PRODUCTION_URL: &str = "https://api.asaas.com/v3";
const SANDBOX_URL: &str = "https://sandbox.asaas.com/api/v3";
const BREAKER_NAME: &str = "asaas-api";

/// Asaas gateway adapter
pub struct AsaasGateway {
    client: GatewayClient,
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditLog>,
    breaker: Arc<CircuitBreaker>,
}

impl AsaasGateway {
    /// Create an adapter for the given environment
    pub fn new(
        api_key: SecretString,
        environment: Environment,
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditLog>,
        breakers: &BreakerRegistry,
    ) -> Self {
        let base_url = match environment {
            Environment::Sandbox => SANDBOX_URL,
            Environment::Production => PRODUCTION_URL,
        };
        Self::with_base_url(base_url, api_key, store, audit, breakers)
    }

    /// Create an adapter against a custom base URL. Tests point this at a
    /// mock server.
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: SecretString,
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditLog>,
        breakers: &BreakerRegistry,
    ) -> Self {
        Self {
            client: GatewayClient::new(base_url, api_key, AuthStyle::Header("access_token")),
            store,
            audit,
            breaker: breakers.get_or_create(BREAKER_NAME),
        }
    }

    async fn pix_flow(&self, request: &ChargeRequest) -> GatewayResult<ChargeResponse> {
        let customer_id = self.find_or_create_customer(request).await?;

        let body = AsaasPaymentBody {
            customer: customer_id,
            billing_type: "PIX",
            value: decimal_units(request.amount),
            due_date: next_day(),
            external_reference: request.order_id.clone(),
            description: request.description.clone(),
            installment_count: None,
            credit_card_token: None,
            split: build_split(request)?,
        };

        let response = guarded_call(&self.breaker, || self.client.post("/payments", &body)).await?;
        let http_status = response.status();
        let raw: serde_json::Value = response.json().await?;

        if !http_status.is_success() {
            let message = extract_error(&raw, http_status);
            warn!(
                order_id = %request.order_id,
                status = %http_status,
                message,
                "Asaas refused the PIX charge"
            );
            return Ok(ChargeResponse::failure(GatewayPaymentStatus::Error, message).with_raw(raw));
        }

        let payment: AsaasPayment = serde_json::from_value(raw.clone())?;
        let (qr, raw_qr) = self.fetch_pix_qr(&payment.id).await?;
        debug!(
            order_id = %request.order_id,
            payment_id = %payment.id,
            status = %payment.status,
            "Asaas PIX charge created"
        );

        Ok(
            ChargeResponse::success(payment.id.clone(), map_status(&payment.status))
                .with_qr(qr.payload, Some(qr.encoded_image))
                .with_raw(serde_json::json!({ "payment": raw, "qr_code": raw_qr })),
        )
    }

    async fn card_flow(&self, request: &ChargeRequest, token: String) -> GatewayResult<ChargeResponse> {
        let customer_id = self.find_or_create_customer(request).await?;

        let body = AsaasPaymentBody {
            customer: customer_id,
            billing_type: "CREDIT_CARD",
            value: decimal_units(request.amount),
            due_date: next_day(),
            external_reference: request.order_id.clone(),
            description: request.description.clone(),
            installment_count: Some(request.installments.unwrap_or(1)),
            credit_card_token: Some(token),
            split: build_split(request)?,
        };

        let response = guarded_call(&self.breaker, || self.client.post("/payments", &body)).await?;
        let http_status = response.status();
        let raw: serde_json::Value = response.json().await?;

        if !http_status.is_success() {
            let message = extract_error(&raw, http_status);
            warn!(
                order_id = %request.order_id,
                status = %http_status,
                message,
                "Asaas refused the card charge"
            );
            return Ok(ChargeResponse::failure(GatewayPaymentStatus::Error, message).with_raw(raw));
        }

        let payment: AsaasPayment = serde_json::from_value(raw.clone())?;
        debug!(
            order_id = %request.order_id,
            payment_id = %payment.id,
            status = %payment.status,
            "Asaas card charge created"
        );

        Ok(ChargeResponse::success(payment.id.clone(), map_status(&payment.status)).with_raw(raw))
    }

    /// Look the customer up by document, creating it when absent.
    ///
    /// Asaas deduplicates customers by CPF/CNPJ; charging an existing
    /// customer twice must not create a second record.
    async fn find_or_create_customer(&self, request: &ChargeRequest) -> GatewayResult<String> {
        let digits: String = request
            .customer_document
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();

        if !digits.is_empty()
            && let Some(existing) = self.find_customer(&digits).await?
        {
            debug!(customer_id = %existing.id, "Asaas customer found by document");
            return Ok(existing.id);
        }

        self.create_customer(request, &digits).await
    }

    async fn find_customer(&self, document: &str) -> GatewayResult<Option<AsaasCustomer>> {
        let path = format!("/customers?cpfCnpj={document}");
        let response = guarded_call(&self.breaker, || self.client.get(&path)).await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let list: AsaasCustomerList = response.json().await?;
        Ok(list.data.into_iter().next())
    }

    async fn create_customer(
        &self,
        request: &ChargeRequest,
        document: &str,
    ) -> GatewayResult<String> {
        let body = AsaasCustomerBody {
            name: request.customer_name.clone(),
            email: request.customer_email.clone(),
            cpf_cnpj: document.to_string(),
            notification_disabled: false,
        };

        let response = guarded_call(&self.breaker, || self.client.post("/customers", &body)).await?;
        let status = response.status();
        if !status.is_success() {
            let raw: serde_json::Value = response.json().await.unwrap_or_default();
            let message = extract_error(&raw, status);
            return Err(GatewayError::Provider(format!(
                "customer creation failed: {message}"
            )));
        }

        let customer: AsaasCustomer = response.json().await?;
        info!(customer_id = %customer.id, "Asaas customer created");
        Ok(customer.id)
    }

    async fn fetch_pix_qr(
        &self,
        payment_id: &str,
    ) -> GatewayResult<(AsaasPixQr, serde_json::Value)> {
        let path = format!("/payments/{payment_id}/pixQrCode");
        let response = guarded_call(&self.breaker, || self.client.get(&path)).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "PIX QR code fetch for payment {payment_id} failed: HTTP {status}: {body}"
            )));
        }

        let raw: serde_json::Value = response.json().await?;
        let qr: AsaasPixQr = serde_json::from_value(raw.clone())?;
        Ok((qr, raw))
    }
}

#[async_trait]
impl PaymentGateway for AsaasGateway {
    fn name(&self) -> &'static str {
        "asaas"
    }

    async fn create_pix_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResponse> {
        verify_order_amount(self.store.as_ref(), self.audit.as_ref(), "asaas", request).await?;

        info!(order_id = %request.order_id, "Creating Asaas PIX charge");
        match self.pix_flow(request).await {
            Err(GatewayError::CircuitOpen(_)) => {
                warn!(order_id = %request.order_id, "Asaas circuit open, refusing charge locally");
                Ok(ChargeResponse::unavailable("asaas"))
            }
            other => other,
        }
    }

    async fn create_card_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResponse> {
        verify_order_amount(self.store.as_ref(), self.audit.as_ref(), "asaas", request).await?;
        let token = require_card_token(request)?.to_string();

        info!(order_id = %request.order_id, "Creating Asaas card charge");
        match self.card_flow(request, token).await {
            Err(GatewayError::CircuitOpen(_)) => {
                warn!(order_id = %request.order_id, "Asaas circuit open, refusing charge locally");
                Ok(ChargeResponse::unavailable("asaas"))
            }
            other => other,
        }
    }

    async fn validate_credentials(&self) -> bool {
        match self.client.get("/finance/balance").await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!(error = %err, "Asaas credential check failed");
                false
            }
        }
    }
}

fn map_status(status: &str) -> GatewayPaymentStatus {
    match status {
        "RECEIVED" | "CONFIRMED" | "RECEIVED_IN_CASH" => GatewayPaymentStatus::Approved,
        "PENDING" | "AWAITING_RISK_ANALYSIS" => GatewayPaymentStatus::Pending,
        _ => GatewayPaymentStatus::Error,
    }
}

/// Due date for a fresh charge, tomorrow in `YYYY-MM-DD`
fn next_day() -> String {
    (Utc::now() + chrono::Duration::days(1))
        .format("%Y-%m-%d")
        .to_string()
}

fn build_split(request: &ChargeRequest) -> GatewayResult<Option<Vec<AsaasSplit>>> {
    let splits: Vec<AsaasSplit> = usable_splits("asaas", request)?
        .into_iter()
        .map(|rule| AsaasSplit {
            wallet_id: rule.recipient_id.clone().unwrap_or_default(),
            fixed_value: decimal_units(Money::new(rule.amount, request.amount.currency)),
            description: format!("Split {}", rule.role.as_str()),
        })
        .collect();
    Ok((!splits.is_empty()).then_some(splits))
}

fn extract_error(raw: &serde_json::Value, status: reqwest::StatusCode) -> String {
    let api_error: AsaasApiError = serde_json::from_value(raw.clone()).unwrap_or_default();
    api_error
        .errors
        .into_iter()
        .find_map(|detail| detail.description)
        .or(api_error.message)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AsaasCustomerBody {
    name: String,
    email: String,
    cpf_cnpj: String,
    notification_disabled: bool,
}

#[derive(Debug, Deserialize)]
struct AsaasCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AsaasCustomerList {
    #[serde(default)]
    data: Vec<AsaasCustomer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AsaasPaymentBody {
    customer: String,
    billing_type: &'static str,
    value: f64,
    due_date: String,
    external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    installment_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credit_card_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    split: Option<Vec<AsaasSplit>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AsaasSplit {
    wallet_id: String,
    fixed_value: f64,
    description: String,
}

#[derive(Debug, Deserialize)]
struct AsaasPayment {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsaasPixQr {
    encoded_image: String,
    payload: String,
    #[serde(default)]
    #[allow(dead_code)]
    expiration_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AsaasApiError {
    #[serde(default)]
    errors: Vec<AsaasErrorDetail>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AsaasErrorDetail {
    description: Option<String>,
    #[allow(dead_code)]
    code: Option<String>,
}
