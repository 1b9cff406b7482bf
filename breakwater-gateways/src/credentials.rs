//! Gateway credential bundles

use secrecy::SecretString;

/// Provider environment a credential targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
}

impl Environment {
    pub fn is_sandbox(&self) -> bool {
        matches!(self, Self::Sandbox)
    }
}

/// Credentials for one provider account.
///
/// Field names mirror what each provider calls its secret: MercadoPago uses
/// `access_token`, Asaas `api_key`, PushinPay `token`. The factory checks
/// the field its provider requires and reports the missing field by name.
#[derive(Debug, Default)]
pub struct GatewayCredentials {
    pub access_token: Option<SecretString>,
    pub api_key: Option<SecretString>,
    pub token: Option<SecretString>,
    pub environment: Environment,
    /// Where the credential came from (vault path, env var), for diagnostics
    pub source: Option<String>,
}

impl GatewayCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// With a MercadoPago access token
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(SecretString::new(token.into().into()));
        self
    }

    /// With an Asaas API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(key.into().into()));
        self
    }

    /// With a PushinPay token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into().into()));
        self
    }

    /// Target the provider sandbox
    pub fn sandbox(mut self) -> Self {
        self.environment = Environment::Sandbox;
        self
    }

    /// With a credential source tag
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_builder() {
        let creds = GatewayCredentials::new()
            .access_token("APP_USR-123")
            .sandbox()
            .source("env:MP_ACCESS_TOKEN");

        assert_eq!(
            creds.access_token.as_ref().unwrap().expose_secret(),
            "APP_USR-123"
        );
        assert!(creds.api_key.is_none());
        assert!(creds.environment.is_sandbox());
        assert_eq!(creds.source.as_deref(), Some("env:MP_ACCESS_TOKEN"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = GatewayCredentials::new().token("super-secret-token");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("super-secret-token"));
    }
}
