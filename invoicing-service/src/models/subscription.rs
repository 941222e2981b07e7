//! Subscription and plan tier models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A stored string that does not name a known variant.
#[derive(Debug, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// How usage is counted against a plan's limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    /// Everything the user has ever created.
    Lifetime,
    /// Only rows created since the active subscription's `start_date`.
    SubscriptionTerm,
    /// No limits apply.
    Unmetered,
}

/// Limits and features attached to a plan tier.
///
/// `None` limits mean unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub invoices: Option<u64>,
    pub clients: Option<u64>,
    pub period: QuotaPeriod,
    /// Checkout price in paise.
    pub price_paise: u64,
    pub watermark: bool,
    pub template_choice: bool,
}

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Pro, PlanTier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    /// The quota table. Adding a tier means adding a row here.
    pub const fn limits(self) -> PlanLimits {
        match self {
            PlanTier::Free => PlanLimits {
                invoices: Some(5),
                clients: Some(1),
                period: QuotaPeriod::Lifetime,
                price_paise: 0,
                watermark: true,
                template_choice: false,
            },
            PlanTier::Pro => PlanLimits {
                invoices: Some(10),
                clients: Some(5),
                period: QuotaPeriod::SubscriptionTerm,
                price_paise: 49_900,
                watermark: false,
                template_choice: true,
            },
            PlanTier::Enterprise => PlanLimits {
                invoices: None,
                clients: None,
                period: QuotaPeriod::Unmetered,
                price_paise: 199_900,
                watermark: false,
                template_choice: true,
            },
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlanTier::Free => "Free",
            PlanTier::Pro => "Pro",
            PlanTier::Enterprise => "Enterprise",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            _ => Err(UnknownVariant {
                kind: "plan type",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for PlanTier {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for SubscriptionStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            _ => Err(UnknownVariant {
                kind: "subscription status",
                value,
            }),
        }
    }
}

/// Subscription. At most one per user is `active`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub plan_type: PlanTier,
    #[sqlx(try_from = "String")]
    pub status: SubscriptionStatus,
    /// Opens the quota period for term-counted plans.
    pub start_date: DateTime<Utc>,
    pub payment_reference: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
