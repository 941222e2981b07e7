//! Invoice model for invoicing-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::subscription::UnknownVariant;

/// Invoice status.
///
/// `draft -> finalized -> paid`, or `draft -> cancelled`. Only drafts are editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Finalized,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Finalized => "finalized",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "finalized" => Some(InvoiceStatus::Finalized),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, InvoiceStatus::Draft)
    }

    /// Counts toward revenue on the dashboard.
    pub fn counts_as_revenue(&self) -> bool {
        !matches!(self, InvoiceStatus::Cancelled)
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InvoiceStatus::from_string(&value).ok_or(UnknownVariant {
            kind: "invoice status",
            value,
        })
    }
}

/// Tax breakdown for an invoice. `total` is always the sum of the other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total: Decimal,
}

/// Invoice document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    /// Assigned at finalize; drafts carry none.
    pub invoice_number: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub terms_conditions: Option<String>,
    pub signature_url: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Invoice row joined with its client's name, as returned by list queries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceListEntry {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub invoice: Invoice,
    pub client_name: Option<String>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    /// Case-insensitive match on invoice number or client name.
    pub search: Option<String>,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl Default for ListInvoicesFilter {
    fn default() -> Self {
        Self {
            status: None,
            client_id: None,
            search: None,
            page: 1,
            limit: 20,
        }
    }
}

impl ListInvoicesFilter {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub totals: TaxBreakdown,
    pub notes: Option<String>,
    pub terms_conditions: Option<String>,
    pub signature_url: Option<String>,
}

/// Full replacement of a draft's editable fields.
///
/// `signature_url` keeps the stored value when `None`.
#[derive(Debug, Clone)]
pub struct UpdateDraftInvoice {
    pub client_id: Uuid,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub totals: TaxBreakdown,
    pub notes: Option<String>,
    pub terms_conditions: Option<String>,
    pub signature_url: Option<String>,
}
