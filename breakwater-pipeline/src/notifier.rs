//! Outbound webhook delivery to vendor endpoints.
//!
//! Vendors register HTTPS targets per event; the notifier signs each
//! delivery with the target's secret and retries transient failures with
//! exponential backoff. Every delivery leaves an [`OutboundDelivery`]
//! record behind for inspection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use breakwater_core::{EventType, Order};
use chrono::Utc;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::delivery::{DeliveryStatus, NotificationPayload, OutboundDelivery};
use crate::error::PipelineResult;

type HmacSha256 = Hmac<Sha256>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent presented to vendor endpoints.
pub const USER_AGENT: &str = "Breakwater-Webhook/1.0";

/// Header names carried on every delivery.
pub mod headers {
    /// Hex HMAC-SHA256 of `"{timestamp}.{body}"`.
    pub const SIGNATURE: &str = "X-Breakwater-Signature";
    /// Unix milliseconds at signing time.
    pub const TIMESTAMP: &str = "X-Breakwater-Timestamp";
    pub const EVENT: &str = "X-Breakwater-Event";
    pub const DELIVERY_ID: &str = "X-Breakwater-Delivery-Id";
}

/// A vendor-registered webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTarget {
    pub id: String,
    pub url: String,
    /// Per-target signing secret.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Subscribed event names. Empty means every event.
    #[serde(default)]
    pub events: HashSet<String>,
    pub active: bool,
}

impl WebhookTarget {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            secret: secret.into(),
            events: HashSet::new(),
            active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Restrict the target to specific events.
    pub fn with_events(mut self, events: Vec<&str>) -> Self {
        self.events = events.into_iter().map(String::from).collect();
        self
    }

    pub fn is_subscribed_to(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.contains(event)
    }
}

/// Per-vendor store of webhook targets.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<String, Vec<WebhookTarget>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target for a vendor, validating its URL first.
    pub fn register(
        &self,
        vendor_id: impl Into<String>,
        target: WebhookTarget,
    ) -> PipelineResult<String> {
        url::Url::parse(&target.url)?;
        let id = target.id.clone();
        self.targets
            .write()
            .entry(vendor_id.into())
            .or_default()
            .push(target);
        Ok(id)
    }

    /// Active targets for a vendor subscribed to `event`.
    pub fn targets_for(&self, vendor_id: &str, event: &str) -> Vec<WebhookTarget> {
        self.targets
            .read()
            .get(vendor_id)
            .map(|list| {
                list.iter()
                    .filter(|t| t.active && t.is_subscribed_to(event))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deactivate a target. Returns `false` when it does not exist.
    pub fn deactivate(&self, vendor_id: &str, target_id: &str) -> bool {
        let mut targets = self.targets.write();
        match targets
            .get_mut(vendor_id)
            .and_then(|list| list.iter_mut().find(|t| t.id == target_id))
        {
            Some(target) => {
                target.active = false;
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.targets.read().values().map(Vec::len).sum()
    }
}

/// Retry schedule for failed deliveries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before a delivery is permanently failed.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            jitter: false,
            ..Default::default()
        }
    }

    /// Fixed delay between a fixed number of attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay to wait after the given (1-based) attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32 - 1);
        let capped = base.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Up to 25% over the base, seeded from the clock.
            capped * (1.0 + time_jitter() * 0.25)
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

fn time_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Signs and delivers order notifications to registered targets.
pub struct OutboundNotifier {
    http: Client,
    policy: RetryPolicy,
    registry: Arc<TargetRegistry>,
    log: RwLock<Vec<OutboundDelivery>>,
}

impl OutboundNotifier {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            policy: RetryPolicy::default(),
            registry,
            log: RwLock::new(Vec::new()),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    /// Delivery records accumulated so far, oldest first.
    pub fn deliveries(&self) -> Vec<OutboundDelivery> {
        self.log.read().clone()
    }

    /// Notify every subscribed target about an order event.
    ///
    /// Never fails as a whole; per-target outcomes are on the returned
    /// records.
    pub async fn notify_order_event(
        &self,
        order: &Order,
        event: EventType,
    ) -> Vec<OutboundDelivery> {
        let targets = self.registry.targets_for(&order.vendor_id, event.as_str());
        if targets.is_empty() {
            debug!(
                order_id = %order.id,
                vendor_id = %order.vendor_id,
                event = %event,
                "No webhook targets subscribed"
            );
            return Vec::new();
        }

        let mut deliveries = Vec::with_capacity(targets.len());
        for target in &targets {
            // Fresh payload per target so each delivery id is unique.
            let payload = NotificationPayload::for_order(order, event);
            let delivery = self.deliver(target, &payload, &order.id).await;
            deliveries.push(delivery);
        }

        self.log.write().extend(deliveries.iter().cloned());
        deliveries
    }

    async fn deliver(
        &self,
        target: &WebhookTarget,
        payload: &NotificationPayload,
        order_id: &str,
    ) -> OutboundDelivery {
        let mut delivery = OutboundDelivery::new(payload, &target.id, &target.url, order_id);

        let body = match payload.to_bytes() {
            Ok(body) => body,
            Err(err) => {
                delivery.mark_failed(format!("Payload serialization failed: {err}"), None);
                return delivery;
            }
        };

        delivery.status = DeliveryStatus::InProgress;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url = %target.url, attempt, delivery_id = %delivery.id, "Webhook delivery attempt");

            // The signature binds the timestamp, so every attempt signs
            // fresh instead of replaying the previous request.
            let timestamp = Utc::now().timestamp_millis();
            let signature = sign_body(&target.secret, timestamp, &body);

            let request = self
                .http
                .post(&target.url)
                .header("Content-Type", "application/json")
                .header(headers::SIGNATURE, signature)
                .header(headers::TIMESTAMP, timestamp.to_string())
                .header(headers::EVENT, &delivery.event)
                .header(headers::DELIVERY_ID, &delivery.id)
                .body(body.clone());

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let response_body = response.text().await.ok();

                    if status.is_success() {
                        info!(
                            url = %target.url,
                            attempt,
                            "Webhook delivered"
                        );
                        delivery.mark_succeeded(status.as_u16(), response_body);
                        return delivery;
                    }

                    let retry =
                        should_retry_status(status.as_u16()) && self.policy.should_retry(attempt);
                    let next_retry = retry.then(|| {
                        Utc::now()
                            + chrono::Duration::from_std(self.policy.delay_for_attempt(attempt))
                                .unwrap_or_default()
                    });

                    warn!(
                        url = %target.url,
                        status = status.as_u16(),
                        attempt,
                        will_retry = retry,
                        "Webhook delivery rejected"
                    );
                    delivery.mark_failed_with_status(status.as_u16(), response_body, next_retry);

                    if !retry {
                        return delivery;
                    }
                }
                Err(err) => {
                    let retry = self.policy.should_retry(attempt);
                    let next_retry = retry.then(|| {
                        Utc::now()
                            + chrono::Duration::from_std(self.policy.delay_for_attempt(attempt))
                                .unwrap_or_default()
                    });

                    warn!(
                        url = %target.url,
                        error = %err,
                        attempt,
                        will_retry = retry,
                        "Webhook delivery error"
                    );
                    delivery.mark_failed(err.to_string(), next_retry);

                    if !retry {
                        return delivery;
                    }
                }
            }

            tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
        }
    }
}

/// Statuses worth another attempt: timeout, throttling, server errors.
fn should_retry_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

fn sign_body(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakwater_core::{Customer, Money, OrderStatus};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn paid_order(vendor_id: &str) -> Order {
        let mut order = Order::new(
            "order_1",
            vendor_id,
            "prod_1",
            Customer::new("Ana Souza", "ana@example.com"),
            Money::brl(9900),
        );
        order.status = OrderStatus::Paid;
        order
    }

    fn notifier_for(server_url: &str, vendor_id: &str, events: Vec<&str>) -> OutboundNotifier {
        let registry = Arc::new(TargetRegistry::new());
        let mut target = WebhookTarget::new(format!("{server_url}/hook"), "whsec_test");
        if !events.is_empty() {
            target = target.with_events(events);
        }
        registry.register(vendor_id, target).unwrap();
        OutboundNotifier::new(registry).with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_delivery_carries_signed_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("User-Agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier_for(&server.uri(), "vendor_1", vec![]);
        let order = paid_order("vendor_1");

        let deliveries = notifier
            .notify_order_event(&order, EventType::PurchaseApproved)
            .await;

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, DeliveryStatus::Succeeded);
        assert_eq!(deliveries[0].attempts, 1);
        assert_eq!(deliveries[0].last_response_body.as_deref(), Some("ok"));

        // The signature must verify against the timestamp header and body.
        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];
        let timestamp: i64 = request.headers[headers::TIMESTAMP]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let signature = request.headers[headers::SIGNATURE].to_str().unwrap();
        assert_eq!(signature, sign_body("whsec_test", timestamp, &request.body));
        assert_eq!(
            request.headers[headers::EVENT].to_str().unwrap(),
            "purchase_approved"
        );
        assert_eq!(
            request.headers[headers::DELIVERY_ID].to_str().unwrap(),
            deliveries[0].id
        );
    }

    #[tokio::test]
    async fn test_retries_transient_failure_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let registry = Arc::new(TargetRegistry::new());
        registry
            .register(
                "vendor_1",
                WebhookTarget::new(format!("{}/hook", server.uri()), "whsec_test"),
            )
            .unwrap();
        let notifier = OutboundNotifier::new(registry)
            .with_retry_policy(RetryPolicy::fixed(3, Duration::ZERO));

        let order = paid_order("vendor_1");
        let deliveries = notifier
            .notify_order_event(&order, EventType::PurchaseApproved)
            .await;

        assert_eq!(deliveries[0].status, DeliveryStatus::Succeeded);
        assert_eq!(deliveries[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_client_error_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .expect(1)
            .mount(&server)
            .await;

        let registry = Arc::new(TargetRegistry::new());
        registry
            .register(
                "vendor_1",
                WebhookTarget::new(format!("{}/hook", server.uri()), "whsec_test"),
            )
            .unwrap();
        let notifier = OutboundNotifier::new(registry)
            .with_retry_policy(RetryPolicy::fixed(3, Duration::ZERO));

        let order = paid_order("vendor_1");
        let deliveries = notifier
            .notify_order_event(&order, EventType::PurchaseApproved)
            .await;

        assert_eq!(deliveries[0].status, DeliveryStatus::PermanentlyFailed);
        assert_eq!(deliveries[0].attempts, 1);
        assert_eq!(deliveries[0].last_status_code, Some(400));
    }

    #[tokio::test]
    async fn test_attempt_ceiling_marks_permanent_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let registry = Arc::new(TargetRegistry::new());
        registry
            .register(
                "vendor_1",
                WebhookTarget::new(format!("{}/hook", server.uri()), "whsec_test"),
            )
            .unwrap();
        let notifier = OutboundNotifier::new(registry)
            .with_retry_policy(RetryPolicy::fixed(3, Duration::ZERO));

        let order = paid_order("vendor_1");
        let deliveries = notifier
            .notify_order_event(&order, EventType::PurchaseApproved)
            .await;

        assert_eq!(deliveries[0].status, DeliveryStatus::PermanentlyFailed);
        assert_eq!(deliveries[0].attempts, 3);
        assert!(deliveries[0].next_retry.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribed_event_skips_delivery() {
        let notifier = notifier_for("http://127.0.0.1:1", "vendor_1", vec!["purchase_approved"]);
        let order = paid_order("vendor_1");

        let deliveries = notifier.notify_order_event(&order, EventType::Refund).await;
        assert!(deliveries.is_empty());
        assert!(notifier.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_vendor_has_no_targets() {
        let notifier = notifier_for("http://127.0.0.1:1", "vendor_1", vec![]);
        let order = paid_order("vendor_2");

        let deliveries = notifier
            .notify_order_event(&order, EventType::PurchaseApproved)
            .await;
        assert!(deliveries.is_empty());
    }

    #[test]
    fn test_registry_rejects_bad_url() {
        let registry = TargetRegistry::new();
        let err = registry
            .register("vendor_1", WebhookTarget::new("not a url", "secret"))
            .unwrap_err();
        assert!(matches!(err, crate::PipelineError::InvalidTargetUrl(_)));
    }

    #[test]
    fn test_registry_deactivation() {
        let registry = TargetRegistry::new();
        let id = registry
            .register("vendor_1", WebhookTarget::new("https://vendor.test/hook", "s"))
            .unwrap();

        assert_eq!(registry.targets_for("vendor_1", "purchase_approved").len(), 1);
        assert!(registry.deactivate("vendor_1", &id));
        assert!(registry.targets_for("vendor_1", "purchase_approved").is_empty());
        assert!(!registry.deactivate("vendor_1", "missing"));
    }

    #[test]
    fn test_default_policy_allows_five_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        // Capped from here on.
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(8));
    }
}
