//! Collaborator seams for pipeline side effects.
//!
//! The pipeline itself owns no business state. Granting members-area
//! access, sending mail, and tracking analytics are all behind traits so
//! the production wiring and the test doubles share one contract. Every
//! method must be idempotent: the lifecycle worker re-runs whole pipelines
//! after partial failures, so a second grant or revoke for the same order
//! has to be a no-op.

use async_trait::async_trait;
use breakwater_core::{EventType, Order, OrderStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

/// Why an order's access is being revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeReason {
    Refunded,
    PartiallyRefunded,
    Chargeback,
    /// Operator-initiated revocation outside the webhook flow.
    Manual,
}

impl RevokeReason {
    /// Reason implied by a refund-family order status, if any.
    pub fn from_status(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Refunded => Some(Self::Refunded),
            OrderStatus::PartiallyRefunded => Some(Self::PartiallyRefunded),
            OrderStatus::Chargeback => Some(Self::Chargeback),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Chargeback => "chargeback",
            Self::Manual => "manual",
        }
    }
}

/// Outcome of a grant attempt.
///
/// A product without a members area still grants "successfully"; the
/// confirmation email simply carries no access link in that case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Whether the purchased product has a members area at all.
    pub has_members_area: bool,
    /// Buyer the access row belongs to, once resolved.
    pub buyer_id: Option<String>,
    /// First purchase for this buyer.
    pub is_new_buyer: bool,
    /// Invite or login URL to embed in the confirmation email.
    pub access_url: Option<String>,
}

impl AccessGrant {
    /// Grant outcome for a product with no members area.
    pub fn none() -> Self {
        Self::default()
    }

    /// Grant outcome for a provisioned buyer.
    pub fn granted(buyer_id: impl Into<String>) -> Self {
        Self {
            has_members_area: true,
            buyer_id: Some(buyer_id.into()),
            is_new_buyer: false,
            access_url: None,
        }
    }

    pub fn new_buyer(mut self) -> Self {
        self.is_new_buyer = true;
        self
    }

    pub fn with_access_url(mut self, url: impl Into<String>) -> Self {
        self.access_url = Some(url.into());
        self
    }
}

/// Members-area access management.
#[async_trait]
pub trait AccessProvisioner: Send + Sync {
    /// Provision access for a paid order.
    async fn grant(&self, order: &Order) -> PipelineResult<AccessGrant>;

    /// Revoke access for a refunded or disputed order.
    ///
    /// Returns `true` when an active grant was actually revoked, `false`
    /// when there was nothing to revoke (no grant, or already inactive).
    async fn revoke(&self, order: &Order, reason: RevokeReason) -> PipelineResult<bool>;

    /// Remove the buyer from member groups tied to the order's product.
    ///
    /// Returns the number of memberships removed.
    async fn remove_group_memberships(&self, order: &Order) -> PipelineResult<u32>;
}

/// Transactional mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the purchase confirmation, including the access link when the
    /// grant produced one.
    async fn send_order_confirmation(
        &self,
        order: &Order,
        access: &AccessGrant,
    ) -> PipelineResult<()>;
}

/// Event tracker integration (conversion analytics).
#[async_trait]
pub trait AnalyticsDispatcher: Send + Sync {
    async fn dispatch(&self, order: &Order, event: EventType) -> PipelineResult<()>;
}

/// In-memory provisioner for tests and local runs.
///
/// Grants are keyed by order id and revocation flips the same entry, so
/// repeated pipeline runs observe the idempotency the trait demands.
#[derive(Debug, Default)]
pub struct MemoryAccessProvisioner {
    grants: RwLock<Vec<GrantRecord>>,
    group_memberships: RwLock<Vec<(String, String)>>,
}

#[derive(Debug, Clone)]
struct GrantRecord {
    order_id: String,
    buyer_id: String,
    active: bool,
    revoke_reason: Option<RevokeReason>,
}

impl MemoryAccessProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a group membership for the buyer tied to `order_id`.
    pub fn add_group_membership(&self, order_id: impl Into<String>, group_id: impl Into<String>) {
        self.group_memberships
            .write()
            .push((order_id.into(), group_id.into()));
    }

    /// Order ids with an active grant.
    pub fn active_grants(&self) -> Vec<String> {
        self.grants
            .read()
            .iter()
            .filter(|g| g.active)
            .map(|g| g.order_id.clone())
            .collect()
    }

    /// Recorded revocation reason for an order, if revoked.
    pub fn revoke_reason(&self, order_id: &str) -> Option<RevokeReason> {
        self.grants
            .read()
            .iter()
            .find(|g| g.order_id == order_id)
            .and_then(|g| g.revoke_reason)
    }
}

#[async_trait]
impl AccessProvisioner for MemoryAccessProvisioner {
    async fn grant(&self, order: &Order) -> PipelineResult<AccessGrant> {
        let mut grants = self.grants.write();
        if let Some(existing) = grants.iter().find(|g| g.order_id == order.id) {
            // Re-run of an already provisioned order.
            return Ok(AccessGrant::granted(existing.buyer_id.clone())
                .with_access_url(format!("https://members.test/access/{}", order.id)));
        }

        let buyer_id = format!("buyer_{}", order.customer.email);
        grants.push(GrantRecord {
            order_id: order.id.clone(),
            buyer_id: buyer_id.clone(),
            active: true,
            revoke_reason: None,
        });

        Ok(AccessGrant::granted(buyer_id)
            .new_buyer()
            .with_access_url(format!("https://members.test/access/{}", order.id)))
    }

    async fn revoke(&self, order: &Order, reason: RevokeReason) -> PipelineResult<bool> {
        let mut grants = self.grants.write();
        match grants.iter_mut().find(|g| g.order_id == order.id) {
            Some(grant) if grant.active => {
                grant.active = false;
                grant.revoke_reason = Some(reason);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn remove_group_memberships(&self, order: &Order) -> PipelineResult<u32> {
        let mut memberships = self.group_memberships.write();
        let before = memberships.len();
        memberships.retain(|(order_id, _)| order_id != &order.id);
        Ok((before - memberships.len()) as u32)
    }
}

/// In-memory mailer recording every send.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: RwLock<Vec<SentMail>>,
}

/// One recorded confirmation email.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub order_id: String,
    pub recipient: String,
    pub access_url: Option<String>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.read().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.read().is_empty()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_order_confirmation(
        &self,
        order: &Order,
        access: &AccessGrant,
    ) -> PipelineResult<()> {
        if order.customer.email.is_empty() {
            return Err(PipelineError::Mail("order has no customer email".into()));
        }
        self.sent.write().push(SentMail {
            order_id: order.id.clone(),
            recipient: order.customer.email.clone(),
            access_url: access.access_url.clone(),
        });
        Ok(())
    }
}

/// Mailer that only logs, for deployments without a mail integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_order_confirmation(
        &self,
        order: &Order,
        access: &AccessGrant,
    ) -> PipelineResult<()> {
        info!(
            order_id = %order.id,
            recipient = %order.customer.email,
            has_access_url = access.access_url.is_some(),
            "Order confirmation (mailer not configured)"
        );
        Ok(())
    }
}
