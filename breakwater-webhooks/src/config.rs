//! Configuration for the ingestion endpoints.

use secrecy::SecretString;

use crate::verify::AllowlistMode;
use crate::verify::signature::SIGNATURE_MAX_AGE_SECS;

/// Per-source requests per minute on the MercadoPago endpoint. MercadoPago
/// sends one notification per payment change; 30 covers redelivery bursts.
pub const DEFAULT_MERCADOPAGO_RATE_LIMIT: u64 = 30;

/// Per-source requests per minute on the PushinPay endpoint. PushinPay
/// replays its whole backlog after provider-side incidents, so the
/// ceiling is an order of magnitude higher.
pub const DEFAULT_PUSHINPAY_RATE_LIMIT: u64 = 300;

/// Settings for the provider webhook endpoints.
///
/// Every credential is optional. A missing secret degrades to a coded
/// per-request rejection instead of refusing to start, so one
/// unconfigured provider does not take the other endpoints down.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// MercadoPago webhook signing secret.
    pub mercadopago_secret: Option<SecretString>,
    /// Shared token expected in the `asaas-access-token` header.
    pub asaas_token: Option<SecretString>,
    /// Shared token expected in the `x-pushinpay-token` header.
    pub pushinpay_token: Option<SecretString>,
    /// Treatment of Asaas requests from outside the published address list.
    pub asaas_allowlist_mode: AllowlistMode,
    /// Requests per source per minute on the MercadoPago endpoint.
    pub mercadopago_rate_limit: u64,
    /// Requests per source per minute on the PushinPay endpoint.
    pub pushinpay_rate_limit: u64,
    /// Oldest accepted signature timestamp, in seconds.
    pub signature_max_age_secs: i64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            mercadopago_secret: None,
            asaas_token: None,
            pushinpay_token: None,
            asaas_allowlist_mode: AllowlistMode::default(),
            mercadopago_rate_limit: DEFAULT_MERCADOPAGO_RATE_LIMIT,
            pushinpay_rate_limit: DEFAULT_PUSHINPAY_RATE_LIMIT,
            signature_max_age_secs: SIGNATURE_MAX_AGE_SECS,
        }
    }
}

impl IngestionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> IngestionConfigBuilder {
        IngestionConfigBuilder::new()
    }
}

/// Builder for [`IngestionConfig`].
#[derive(Debug, Clone, Default)]
pub struct IngestionConfigBuilder {
    config: IngestionConfig,
}

impl IngestionConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IngestionConfig::default(),
        }
    }

    /// Sets the MercadoPago webhook signing secret.
    pub fn mercadopago_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.mercadopago_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Sets the Asaas shared webhook token.
    pub fn asaas_token(mut self, token: impl Into<String>) -> Self {
        self.config.asaas_token = Some(SecretString::from(token.into()));
        self
    }

    /// Sets the PushinPay shared webhook token.
    pub fn pushinpay_token(mut self, token: impl Into<String>) -> Self {
        self.config.pushinpay_token = Some(SecretString::from(token.into()));
        self
    }

    /// Sets how Asaas requests from unlisted addresses are treated.
    pub fn asaas_allowlist_mode(mut self, mode: AllowlistMode) -> Self {
        self.config.asaas_allowlist_mode = mode;
        self
    }

    pub fn mercadopago_rate_limit(mut self, per_minute: u64) -> Self {
        self.config.mercadopago_rate_limit = per_minute;
        self
    }

    pub fn pushinpay_rate_limit(mut self, per_minute: u64) -> Self {
        self.config.pushinpay_rate_limit = per_minute;
        self
    }

    /// Sets the acceptance window for signed timestamps.
    pub fn signature_max_age_secs(mut self, secs: i64) -> Self {
        self.config.signature_max_age_secs = secs;
        self
    }

    pub fn build(self) -> IngestionConfig {
        self.config
    }
}
