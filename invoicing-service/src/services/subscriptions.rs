//! Subscription management: current plan, features, checkout, payment
//! verification and cancellation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{PlanTier, Subscription, SubscriptionStatus};
use crate::services::metrics::SUBSCRIPTION_CHANGES_TOTAL;
use crate::services::payment::{OrderRequest, PaymentGateway};
use crate::services::quota::Allowance;
use crate::services::store::Store;

const CURRENCY: &str = "INR";

/// Active plan as reported to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentPlan {
    pub subscription_id: Option<Uuid>,
    pub plan_type: PlanTier,
    pub status: SubscriptionStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
}

impl From<Option<Subscription>> for CurrentPlan {
    fn from(subscription: Option<Subscription>) -> Self {
        match subscription {
            Some(s) => Self {
                subscription_id: Some(s.subscription_id),
                plan_type: s.plan_type,
                status: s.status,
                start_date: Some(s.start_date),
                payment_reference: s.payment_reference,
            },
            None => Self {
                subscription_id: None,
                plan_type: PlanTier::Free,
                status: SubscriptionStatus::Active,
                start_date: None,
                payment_reference: None,
            },
        }
    }
}

/// Features unlocked by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFeatures {
    pub total_invoices: Allowance,
    pub total_clients: Allowance,
    pub watermark: bool,
    pub template_choice: bool,
}

impl PlanFeatures {
    pub fn of(plan: PlanTier) -> Self {
        let limits = plan.limits();
        let allowance = |limit: Option<u64>| limit.map_or(Allowance::Unlimited, Allowance::Limited);
        Self {
            total_invoices: allowance(limits.invoices),
            total_clients: allowance(limits.clients),
            watermark: limits.watermark,
            template_choice: limits.template_choice,
        }
    }
}

/// Plan plus its features.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStatus {
    #[serde(flatten)]
    pub current: CurrentPlan,
    pub features: PlanFeatures,
}

/// Result of starting a checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// The plan is already in force.
    Activated {
        subscription: Subscription,
        mode: &'static str,
    },
    /// The caller must complete payment for `order_id`, then verify.
    PaymentRequired {
        order_id: String,
        amount: u64,
        currency: String,
        key_id: String,
    },
}

/// Checkout proof returned by the payment widget.
#[derive(Debug, Clone)]
pub struct PaymentProof {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub plan: PlanTier,
}

#[derive(Clone)]
pub struct SubscriptionManager {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    async fn require_user(&self, user_id: Uuid) -> Result<(), AppError> {
        match self.store.get_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(anyhow::anyhow!("User not found"))),
        }
    }

    pub async fn current(&self, user_id: Uuid) -> Result<CurrentPlan, AppError> {
        self.require_user(user_id).await?;
        Ok(self.store.active_subscription(user_id).await?.into())
    }

    pub async fn status(&self, user_id: Uuid) -> Result<PlanStatus, AppError> {
        let current = self.current(user_id).await?;
        Ok(PlanStatus {
            features: PlanFeatures::of(current.plan_type),
            current,
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, plan = %plan, gateway = self.gateway.name()))]
    pub async fn checkout(&self, user_id: Uuid, plan: PlanTier) -> Result<CheckoutOutcome, AppError> {
        self.require_user(user_id).await?;

        let price = plan.limits().price_paise;
        if self.gateway.applies_immediately() || price == 0 {
            let subscription = self.store.replace_subscription(user_id, plan, None).await?;
            SUBSCRIPTION_CHANGES_TOTAL
                .with_label_values(&[plan.as_str(), "checkout"])
                .inc();
            info!(subscription_id = %subscription.subscription_id, "Plan applied at checkout");
            return Ok(CheckoutOutcome::Activated {
                subscription,
                mode: self.gateway.name(),
            });
        }

        let request = OrderRequest {
            amount: price,
            currency: CURRENCY.to_string(),
            receipt: format!("sub_{}", Uuid::new_v4()),
            notes: serde_json::json!({
                "user_id": user_id,
                "plan_type": plan.as_str(),
            }),
        };
        let order = self.gateway.create_order(&request).await?;

        info!(order_id = %order.order_id, amount = order.amount, "Checkout order created");

        Ok(CheckoutOutcome::PaymentRequired {
            order_id: order.order_id,
            amount: order.amount,
            currency: order.currency,
            key_id: self.gateway.key_id().to_string(),
        })
    }

    #[instrument(skip(self, proof), fields(user_id = %user_id, order_id = %proof.order_id, plan = %proof.plan))]
    pub async fn verify(&self, user_id: Uuid, proof: PaymentProof) -> Result<Subscription, AppError> {
        self.require_user(user_id).await?;

        if proof.plan == PlanTier::Free {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "The free plan does not require payment"
            )));
        }

        let valid = self
            .gateway
            .verify_signature(&proof.order_id, &proof.payment_id, &proof.signature)?;
        if !valid {
            warn!("Rejected payment with invalid signature");
            return Err(AppError::BadRequest(anyhow::anyhow!("Invalid payment signature")));
        }

        let subscription = self
            .store
            .replace_subscription(user_id, proof.plan, Some(&proof.payment_id))
            .await?;
        SUBSCRIPTION_CHANGES_TOTAL
            .with_label_values(&[proof.plan.as_str(), "payment"])
            .inc();
        info!(subscription_id = %subscription.subscription_id, "Payment verified, plan activated");

        Ok(subscription)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn cancel(&self, user_id: Uuid) -> Result<Subscription, AppError> {
        self.require_user(user_id).await?;
        let subscription = self
            .store
            .replace_subscription(user_id, PlanTier::Free, None)
            .await?;
        SUBSCRIPTION_CHANGES_TOTAL
            .with_label_values(&[PlanTier::Free.as_str(), "cancel"])
            .inc();
        info!(subscription_id = %subscription.subscription_id, "Subscription cancelled, free plan active");
        Ok(subscription)
    }
}
