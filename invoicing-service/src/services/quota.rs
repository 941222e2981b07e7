//! Plan quota enforcement.
//!
//! Checks run only when an invoice or client is created. The caller supplies
//! usage counted over the plan's [`QuotaPeriod`], and must hold the per-user
//! lock between the check and the insert.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use service_core::error::AppError;

use crate::models::{PlanTier, QuotaPeriod, Subscription};

/// A quota-gated creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaAction {
    CreateInvoice,
    CreateClient,
}

impl QuotaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaAction::CreateInvoice => "create_invoice",
            QuotaAction::CreateClient => "create_client",
        }
    }

    fn noun(&self, count: u64) -> &'static str {
        match (self, count) {
            (QuotaAction::CreateInvoice, 1) => "invoice",
            (QuotaAction::CreateInvoice, _) => "invoices",
            (QuotaAction::CreateClient, 1) => "client",
            (QuotaAction::CreateClient, _) => "clients",
        }
    }
}

/// Invoices and clients counted over the current quota period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub invoices: u64,
    pub clients: u64,
}

impl Usage {
    pub fn of(&self, action: QuotaAction) -> u64 {
        match action {
            QuotaAction::CreateInvoice => self.invoices,
            QuotaAction::CreateClient => self.clients,
        }
    }
}

/// Outcome of a quota check. `limit` is `None` for unlimited plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub limit: Option<u64>,
    pub current: u64,
}

/// Remaining allowance: a count, or unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Limited(u64),
    Unlimited,
}

impl Serialize for Allowance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Allowance::Limited(n) => serializer.serialize_u64(*n),
            Allowance::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Start of the counting window, or `None` when every row counts.
pub fn period_start(plan: PlanTier, subscription_start: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match plan.limits().period {
        QuotaPeriod::SubscriptionTerm => subscription_start,
        QuotaPeriod::Lifetime | QuotaPeriod::Unmetered => None,
    }
}

/// Plan in force and its counting window. No active subscription means free.
pub fn effective_plan(active: Option<&Subscription>) -> (PlanTier, Option<DateTime<Utc>>) {
    match active {
        Some(subscription) => (
            subscription.plan_type,
            period_start(subscription.plan_type, Some(subscription.start_date)),
        ),
        None => (PlanTier::Free, None),
    }
}

pub fn limit_for(action: QuotaAction, plan: PlanTier) -> Option<u64> {
    let limits = plan.limits();
    match action {
        QuotaAction::CreateInvoice => limits.invoices,
        QuotaAction::CreateClient => limits.clients,
    }
}

pub fn check_quota(action: QuotaAction, plan: PlanTier, usage: &Usage) -> QuotaDecision {
    let limit = limit_for(action, plan);
    let current = usage.of(action);
    QuotaDecision {
        allowed: limit.is_none_or(|limit| current < limit),
        limit,
        current,
    }
}

/// Fails with `QuotaExceeded` when `action` would exceed the plan's limit.
pub fn enforce(action: QuotaAction, plan: PlanTier, usage: &Usage) -> Result<(), AppError> {
    let decision = check_quota(action, plan, usage);
    if decision.allowed {
        return Ok(());
    }

    let limit = decision.limit.unwrap_or_default();
    let scope = match plan.limits().period {
        QuotaPeriod::SubscriptionTerm => " per subscription term",
        QuotaPeriod::Lifetime | QuotaPeriod::Unmetered => "",
    };
    let upgrade = match plan {
        PlanTier::Free => "Please upgrade to Pro or Enterprise.",
        PlanTier::Pro | PlanTier::Enterprise => "Please upgrade to Enterprise for unlimited usage.",
    };

    crate::services::metrics::QUOTA_REJECTIONS_TOTAL
        .with_label_values(&[action.as_str(), plan.as_str()])
        .inc();

    Err(AppError::QuotaExceeded {
        message: format!(
            "{} plan is limited to {} {}{}. {}",
            plan.display_name(),
            limit,
            action.noun(limit),
            scope,
            upgrade
        ),
        limit,
        current: decision.current,
    })
}

/// Allowance left on the plan, never negative.
pub fn remaining(action: QuotaAction, plan: PlanTier, usage: &Usage) -> Allowance {
    match limit_for(action, plan) {
        Some(limit) => Allowance::Limited(limit.saturating_sub(usage.of(action))),
        None => Allowance::Unlimited,
    }
}
