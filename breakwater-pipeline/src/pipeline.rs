//! Post-transition side-effect orchestration.
//!
//! A status transition commits first; this pipeline runs after and must
//! never undo it. Steps are isolated: one failing step is recorded on the
//! report and the remaining steps still run, because a vendor with a
//! broken mailer still wants analytics, and a buyer whose access grant
//! failed still deserves the confirmation email trail.

use std::sync::Arc;

use breakwater_core::{EventType, Order};
use tracing::{error, info};

use crate::collaborators::{AccessGrant, AccessProvisioner, AnalyticsDispatcher, Mailer, RevokeReason};
use crate::notifier::OutboundNotifier;

/// Step names as they appear on reports.
pub mod steps {
    pub const GRANT_ACCESS: &str = "grant_access";
    pub const REVOKE_ACCESS: &str = "revoke_access";
    pub const REMOVE_GROUP_MEMBERSHIPS: &str = "remove_group_memberships";
    pub const CONFIRMATION_EMAIL: &str = "confirmation_email";
    pub const WEBHOOK_NOTIFICATION: &str = "webhook_notification";
    pub const ANALYTICS: &str = "analytics";
}

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// The step had nothing to do (no members area, no targets).
    Skipped,
    Failed,
}

/// One step's entry on a report.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: &'static str,
    pub outcome: StepOutcome,
    pub error: Option<String>,
}

/// Outcome of a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub order_id: String,
    pub event: EventType,
    steps: Vec<StepReport>,
}

impl PipelineReport {
    fn new(order_id: &str, event: EventType) -> Self {
        Self {
            order_id: order_id.to_string(),
            event,
            steps: Vec::new(),
        }
    }

    fn completed(&mut self, step: &'static str) {
        self.steps.push(StepReport {
            step,
            outcome: StepOutcome::Completed,
            error: None,
        });
    }

    fn skipped(&mut self, step: &'static str) {
        self.steps.push(StepReport {
            step,
            outcome: StepOutcome::Skipped,
            error: None,
        });
    }

    fn failed(&mut self, step: &'static str, error: String) {
        self.steps.push(StepReport {
            step,
            outcome: StepOutcome::Failed,
            error: Some(error),
        });
    }

    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    /// Outcome of a named step, if it ran.
    pub fn outcome(&self, step: &str) -> Option<StepOutcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(|s| s.outcome == StepOutcome::Failed)
    }

    /// `"step: error"` lines for every failed step.
    pub fn errors(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| {
                s.error
                    .as_ref()
                    .map(|error| format!("{}: {error}", s.step))
            })
            .collect()
    }

    /// Joined failure summary, or `None` when everything passed.
    pub fn error_summary(&self) -> Option<String> {
        let errors = self.errors();
        if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        }
    }
}

/// Runs the side-effect sequence for an order transition.
pub struct OrderPipeline {
    access: Arc<dyn AccessProvisioner>,
    mailer: Arc<dyn Mailer>,
    notifier: Arc<OutboundNotifier>,
    analytics: Arc<dyn AnalyticsDispatcher>,
}

impl OrderPipeline {
    pub fn new(
        access: Arc<dyn AccessProvisioner>,
        mailer: Arc<dyn Mailer>,
        notifier: Arc<OutboundNotifier>,
        analytics: Arc<dyn AnalyticsDispatcher>,
    ) -> Self {
        Self {
            access,
            mailer,
            notifier,
            analytics,
        }
    }

    pub fn notifier(&self) -> &Arc<OutboundNotifier> {
        &self.notifier
    }

    /// Side effects for an order that just entered `paid`:
    /// grant access, confirmation email, vendor webhooks, analytics.
    pub async fn run_paid(&self, order: &Order, event: EventType) -> PipelineReport {
        let mut report = PipelineReport::new(&order.id, event);

        let grant = match self.access.grant(order).await {
            Ok(grant) => {
                if grant.has_members_area {
                    report.completed(steps::GRANT_ACCESS);
                } else {
                    report.skipped(steps::GRANT_ACCESS);
                }
                grant
            }
            Err(err) => {
                error!(order_id = %order.id, error = %err, "Access grant failed");
                report.failed(steps::GRANT_ACCESS, err.to_string());
                AccessGrant::none()
            }
        };

        match self.mailer.send_order_confirmation(order, &grant).await {
            Ok(()) => report.completed(steps::CONFIRMATION_EMAIL),
            Err(err) => {
                error!(order_id = %order.id, error = %err, "Confirmation email failed");
                report.failed(steps::CONFIRMATION_EMAIL, err.to_string());
            }
        }

        self.notify_step(&mut report, order, event).await;
        self.analytics_step(&mut report, order, event).await;

        info!(
            order_id = %order.id,
            event = %event,
            failed_steps = report.errors().len(),
            "Paid pipeline finished"
        );
        report
    }

    /// Side effects for refunded, partially refunded, or charged-back
    /// orders: revoke access, remove group memberships, vendor webhooks,
    /// analytics.
    pub async fn run_refund(&self, order: &Order, event: EventType) -> PipelineReport {
        let mut report = PipelineReport::new(&order.id, event);
        let reason = RevokeReason::from_status(order.status).unwrap_or(RevokeReason::Manual);

        match self.access.revoke(order, reason).await {
            Ok(true) => report.completed(steps::REVOKE_ACCESS),
            // Nothing active to revoke is fine on re-runs.
            Ok(false) => report.skipped(steps::REVOKE_ACCESS),
            Err(err) => {
                error!(order_id = %order.id, error = %err, "Access revocation failed");
                report.failed(steps::REVOKE_ACCESS, err.to_string());
            }
        }

        match self.access.remove_group_memberships(order).await {
            Ok(removed) => {
                info!(order_id = %order.id, removed, "Group memberships removed");
                report.completed(steps::REMOVE_GROUP_MEMBERSHIPS);
            }
            Err(err) => {
                error!(order_id = %order.id, error = %err, "Group removal failed");
                report.failed(steps::REMOVE_GROUP_MEMBERSHIPS, err.to_string());
            }
        }

        self.notify_step(&mut report, order, event).await;
        self.analytics_step(&mut report, order, event).await;

        info!(
            order_id = %order.id,
            event = %event,
            reason = reason.as_str(),
            failed_steps = report.errors().len(),
            "Refund pipeline finished"
        );
        report
    }

    async fn notify_step(&self, report: &mut PipelineReport, order: &Order, event: EventType) {
        let deliveries = self.notifier.notify_order_event(order, event).await;
        if deliveries.is_empty() {
            report.skipped(steps::WEBHOOK_NOTIFICATION);
            return;
        }

        let failed = deliveries
            .iter()
            .filter(|d| !d.status.is_success())
            .count();
        if failed == 0 {
            report.completed(steps::WEBHOOK_NOTIFICATION);
        } else {
            report.failed(
                steps::WEBHOOK_NOTIFICATION,
                format!("{failed} of {} deliveries failed", deliveries.len()),
            );
        }
    }

    async fn analytics_step(&self, report: &mut PipelineReport, order: &Order, event: EventType) {
        match self.analytics.dispatch(order, event).await {
            Ok(()) => report.completed(steps::ANALYTICS),
            Err(err) => {
                error!(order_id = %order.id, error = %err, "Analytics dispatch failed");
                report.failed(steps::ANALYTICS, err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::MemoryAnalytics;
    use crate::collaborators::{MemoryAccessProvisioner, MemoryMailer};
    use crate::error::{PipelineError, PipelineResult};
    use crate::notifier::{RetryPolicy, TargetRegistry, WebhookTarget};
    use async_trait::async_trait;
    use breakwater_core::{Customer, Money, OrderStatus};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        access: Arc<MemoryAccessProvisioner>,
        mailer: Arc<MemoryMailer>,
        analytics: Arc<MemoryAnalytics>,
        registry: Arc<TargetRegistry>,
        pipeline: OrderPipeline,
    }

    fn fixture() -> Fixture {
        let access = Arc::new(MemoryAccessProvisioner::new());
        let mailer = Arc::new(MemoryMailer::new());
        let analytics = Arc::new(MemoryAnalytics::new());
        let registry = Arc::new(TargetRegistry::new());
        let notifier =
            Arc::new(OutboundNotifier::new(registry.clone()).with_retry_policy(RetryPolicy::none()));
        let pipeline = OrderPipeline::new(
            access.clone(),
            mailer.clone(),
            notifier,
            analytics.clone(),
        );
        Fixture {
            access,
            mailer,
            analytics,
            registry,
            pipeline,
        }
    }

    fn order_with_status(status: OrderStatus) -> Order {
        let mut order = Order::new(
            "order_1",
            "vendor_1",
            "prod_1",
            Customer::new("Ana Souza", "ana@example.com"),
            Money::brl(9900),
        );
        order.status = status;
        order
    }

    #[tokio::test]
    async fn test_paid_flow_runs_every_step() {
        let fx = fixture();
        let order = order_with_status(OrderStatus::Paid);

        let report = fx
            .pipeline
            .run_paid(&order, EventType::PurchaseApproved)
            .await;

        assert!(!report.has_failures());
        assert_eq!(
            report.outcome(steps::GRANT_ACCESS),
            Some(StepOutcome::Completed)
        );
        assert_eq!(
            report.outcome(steps::CONFIRMATION_EMAIL),
            Some(StepOutcome::Completed)
        );
        // No targets registered.
        assert_eq!(
            report.outcome(steps::WEBHOOK_NOTIFICATION),
            Some(StepOutcome::Skipped)
        );
        assert_eq!(report.outcome(steps::ANALYTICS), Some(StepOutcome::Completed));

        assert_eq!(fx.access.active_grants(), vec!["order_1".to_string()]);
        assert_eq!(fx.mailer.len(), 1);
        assert_eq!(fx.analytics.events()[0].status, "paid");
    }

    #[tokio::test]
    async fn test_paid_flow_delivers_vendor_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture();
        fx.registry
            .register(
                "vendor_1",
                WebhookTarget::new(format!("{}/hook", server.uri()), "whsec_test"),
            )
            .unwrap();
        let order = order_with_status(OrderStatus::Paid);

        let report = fx
            .pipeline
            .run_paid(&order, EventType::PurchaseApproved)
            .await;

        assert_eq!(
            report.outcome(steps::WEBHOOK_NOTIFICATION),
            Some(StepOutcome::Completed)
        );
        assert_eq!(fx.pipeline.notifier().deliveries().len(), 1);
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_order_confirmation(
            &self,
            _order: &Order,
            _access: &AccessGrant,
        ) -> PipelineResult<()> {
            Err(PipelineError::Mail("smtp 550".into()))
        }
    }

    #[tokio::test]
    async fn test_failing_step_does_not_stop_later_steps() {
        let access = Arc::new(MemoryAccessProvisioner::new());
        let analytics = Arc::new(MemoryAnalytics::new());
        let notifier = Arc::new(
            OutboundNotifier::new(Arc::new(TargetRegistry::new()))
                .with_retry_policy(RetryPolicy::none()),
        );
        let pipeline = OrderPipeline::new(
            access.clone(),
            Arc::new(FailingMailer),
            notifier,
            analytics.clone(),
        );
        let order = order_with_status(OrderStatus::Paid);

        let report = pipeline.run_paid(&order, EventType::PurchaseApproved).await;

        assert!(report.has_failures());
        assert_eq!(
            report.outcome(steps::CONFIRMATION_EMAIL),
            Some(StepOutcome::Failed)
        );
        // Later steps still ran.
        assert_eq!(report.outcome(steps::ANALYTICS), Some(StepOutcome::Completed));
        assert_eq!(analytics.len(), 1);
        assert_eq!(report.errors(), vec![
            "confirmation_email: Mail delivery failed: smtp 550".to_string()
        ]);
        assert!(report.error_summary().unwrap().contains("smtp 550"));
    }

    struct FailingAccess;

    #[async_trait]
    impl AccessProvisioner for FailingAccess {
        async fn grant(&self, _order: &Order) -> PipelineResult<AccessGrant> {
            Err(PipelineError::Access("backend timeout".into()))
        }

        async fn revoke(&self, _order: &Order, _reason: RevokeReason) -> PipelineResult<bool> {
            Err(PipelineError::Access("backend timeout".into()))
        }

        async fn remove_group_memberships(&self, _order: &Order) -> PipelineResult<u32> {
            Err(PipelineError::Access("backend timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_grant_still_sends_email_without_access_url() {
        let mailer = Arc::new(MemoryMailer::new());
        let notifier = Arc::new(
            OutboundNotifier::new(Arc::new(TargetRegistry::new()))
                .with_retry_policy(RetryPolicy::none()),
        );
        let pipeline = OrderPipeline::new(
            Arc::new(FailingAccess),
            mailer.clone(),
            notifier,
            Arc::new(MemoryAnalytics::new()),
        );
        let order = order_with_status(OrderStatus::Paid);

        let report = pipeline.run_paid(&order, EventType::PurchaseApproved).await;

        assert_eq!(report.outcome(steps::GRANT_ACCESS), Some(StepOutcome::Failed));
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].access_url.is_none());
    }

    #[tokio::test]
    async fn test_refund_flow_revokes_and_tracks() {
        let fx = fixture();
        let paid = order_with_status(OrderStatus::Paid);
        fx.pipeline.run_paid(&paid, EventType::PurchaseApproved).await;

        let refunded = order_with_status(OrderStatus::Refunded);
        let report = fx.pipeline.run_refund(&refunded, EventType::Refund).await;

        assert!(!report.has_failures());
        assert_eq!(
            report.outcome(steps::REVOKE_ACCESS),
            Some(StepOutcome::Completed)
        );
        assert_eq!(
            report.outcome(steps::REMOVE_GROUP_MEMBERSHIPS),
            Some(StepOutcome::Completed)
        );
        assert_eq!(
            fx.access.revoke_reason("order_1"),
            Some(RevokeReason::Refunded)
        );
        assert!(fx.access.active_grants().is_empty());
        assert_eq!(fx.analytics.events().last().unwrap().status, "refunded");
    }

    #[tokio::test]
    async fn test_refund_without_grant_skips_revocation() {
        let fx = fixture();
        let order = order_with_status(OrderStatus::Chargeback);

        let report = fx.pipeline.run_refund(&order, EventType::Chargeback).await;

        assert_eq!(report.outcome(steps::REVOKE_ACCESS), Some(StepOutcome::Skipped));
        assert!(!report.has_failures());
        assert_eq!(fx.analytics.events()[0].status, "chargedback");
    }

    #[tokio::test]
    async fn test_rerun_after_revocation_is_idempotent() {
        let fx = fixture();
        let paid = order_with_status(OrderStatus::Paid);
        fx.pipeline.run_paid(&paid, EventType::PurchaseApproved).await;

        let refunded = order_with_status(OrderStatus::Refunded);
        let first = fx.pipeline.run_refund(&refunded, EventType::Refund).await;
        let second = fx.pipeline.run_refund(&refunded, EventType::Refund).await;

        assert_eq!(
            first.outcome(steps::REVOKE_ACCESS),
            Some(StepOutcome::Completed)
        );
        // The grant is already inactive on the second pass.
        assert_eq!(
            second.outcome(steps::REVOKE_ACCESS),
            Some(StepOutcome::Skipped)
        );
        assert!(!second.has_failures());
    }
}
