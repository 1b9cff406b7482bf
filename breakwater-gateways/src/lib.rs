//! Payment gateway adapters for Breakwater
//!
//! Unified charge API over the three Brazilian payment providers the
//! platform supports, with per-provider circuit breakers and amount
//! re-validation against the stored order before any network call.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       GatewayFactory                          │
//! │   normalize(provider) → credential check → adapter            │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//!   │ MercadoPago │    │    Asaas    │    │  PushinPay  │
//!   │  PIX + card │    │  PIX + card │    │   PIX only  │
//!   └──────┬──────┘    └──────┬──────┘    └──────┬──────┘
//!          │                  │                  │
//!          └───────── circuit breakers ──────────┘
//!              (shared registry, one per provider)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use breakwater_core::Money;
//! use breakwater_gateways::{ChargeRequest, GatewayCredentials, GatewayFactory};
//!
//! let factory = GatewayFactory::new(store, audit, breakers);
//! let gateway = factory.create(
//!     "mercadopago",
//!     GatewayCredentials::default().access_token("APP_USR-..."),
//! )?;
//!
//! let charge = gateway
//!     .create_pix_charge(&ChargeRequest::new(
//!         "order_42",
//!         Money::brl(9900),
//!         "Ana Souza",
//!         "ana@example.com",
//!     ))
//!     .await?;
//! ```

pub mod credentials;
pub mod error;
pub mod provider;
pub mod types;

pub mod providers;

pub use credentials::*;
pub use error::*;
pub use provider::*;
pub use types::*;

pub use providers::mercadopago::MercadoPagoPayment;
pub use providers::{AsaasGateway, MercadoPagoGateway, PushinPayGateway};

use std::sync::Arc;

use tracing::debug;

use breakwater_core::resilience::BreakerRegistry;
use breakwater_core::{AuditLog, OrderStore};

/// Builds provider adapters from stored credentials.
///
/// Shares one order store, audit log and breaker registry across every
/// adapter it hands out, so two adapters for the same provider trip the
/// same breaker.
pub struct GatewayFactory {
    store: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditLog>,
    breakers: Arc<BreakerRegistry>,
    notification_base: Option<String>,
}

impl GatewayFactory {
    /// Create a factory over shared collaborators
    pub fn new(
        store: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditLog>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            store,
            audit,
            breakers,
            notification_base: None,
        }
    }

    /// Public base URL used to derive per-provider webhook callbacks
    pub fn notification_base(mut self, base: impl Into<String>) -> Self {
        self.notification_base = Some(base.into());
        self
    }

    /// Build the adapter for a provider, validating required credentials.
    ///
    /// Provider names are normalized first (`mercado_pago`, `mercado-pago`
    /// and friends all land on `mercadopago`), so stored vendor
    /// configuration survives spelling drift.
    pub fn create(
        &self,
        provider: &str,
        credentials: GatewayCredentials,
    ) -> GatewayResult<Arc<dyn PaymentGateway>> {
        let canonical = normalize_provider(provider);
        debug!(
            provider = %canonical,
            source = credentials.source.as_deref().unwrap_or("unspecified"),
            "Building gateway adapter"
        );

        match canonical.as_str() {
            "mercadopago" => {
                let access_token = credentials.access_token.ok_or_else(|| {
                    GatewayError::Config("MercadoPago requires access_token".to_string())
                })?;
                let mut gateway = MercadoPagoGateway::new(
                    access_token,
                    self.store.clone(),
                    self.audit.clone(),
                    &self.breakers,
                );
                if let Some(url) = self.notify_url("mercadopago") {
                    gateway = gateway.notification_url(url);
                }
                Ok(Arc::new(gateway))
            }
            "asaas" => {
                let api_key = credentials
                    .api_key
                    .ok_or_else(|| GatewayError::Config("Asaas requires api_key".to_string()))?;
                Ok(Arc::new(AsaasGateway::new(
                    api_key,
                    credentials.environment,
                    self.store.clone(),
                    self.audit.clone(),
                    &self.breakers,
                )))
            }
            "pushinpay" => {
                let token = credentials
                    .token
                    .ok_or_else(|| GatewayError::Config("PushinPay requires token".to_string()))?;
                let mut gateway = PushinPayGateway::new(
                    token,
                    credentials.environment,
                    self.store.clone(),
                    self.audit.clone(),
                    &self.breakers,
                );
                if let Some(url) = self.notify_url("pushinpay") {
                    gateway = gateway.webhook_url(url);
                }
                Ok(Arc::new(gateway))
            }
            other => Err(GatewayError::Config(format!(
                "unknown payment provider: {other}"
            ))),
        }
    }

    fn notify_url(&self, provider: &str) -> Option<String> {
        self.notification_base
            .as_deref()
            .map(|base| format!("{}/webhooks/{provider}", base.trim_end_matches('/')))
    }
}

/// Collapse provider name spellings to canonical keys
pub fn normalize_provider(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match lowered.as_str() {
        "mercado_pago" | "mercado-pago" | "mercado pago" => "mercadopago".to_string(),
        "pushin_pay" | "pushin-pay" | "pushin pay" => "pushinpay".to_string(),
        _ => lowered,
    }
}
