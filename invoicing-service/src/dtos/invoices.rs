use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{InvoiceListEntry, InvoiceStatus, ListInvoicesFilter};
use crate::services::lifecycle::{DraftItem, InvoiceDraft};

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize, Serialize)]
pub struct InvoiceItemRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
}

/// Body of `POST /invoices` and `PUT /invoices/:id`.
#[derive(Debug, Deserialize, Validate)]
pub struct InvoiceRequest {
    #[serde(rename = "clientId")]
    pub client_id: Uuid,
    #[serde(rename = "invoiceDate")]
    pub invoice_date: NaiveDate,
    #[serde(rename = "dueDate")]
    pub due_date: NaiveDate,
    #[validate(length(min = 1, message = "Invoice must have at least one item"))]
    pub items: Vec<InvoiceItemRequest>,
    pub notes: Option<String>,
    pub terms_conditions: Option<String>,
    pub signature_url: Option<String>,
}

impl From<InvoiceRequest> for InvoiceDraft {
    fn from(req: InvoiceRequest) -> Self {
        Self {
            client_id: req.client_id,
            invoice_date: req.invoice_date,
            due_date: req.due_date,
            items: req
                .items
                .into_iter()
                .map(|item| DraftItem {
                    name: item.name,
                    description: item.description,
                    quantity: item.quantity,
                    rate: item.rate,
                })
                .collect(),
            notes: req.notes,
            terms_conditions: req.terms_conditions,
            signature_url: req.signature_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<String>,
    #[serde(alias = "clientId")]
    pub client_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListInvoicesQuery {
    /// Parse filters and clamp paging to `page >= 1`, `1 <= limit <= 100`.
    pub fn into_filter(self) -> Result<ListInvoicesFilter, AppError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(InvoiceStatus::from_string(raw).ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Unknown invoice status '{}'", raw))
            })?),
        };
        let client_id = match self.client_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                AppError::BadRequest(anyhow::anyhow!("Invalid clientId '{}'", raw))
            })?),
        };
        let search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let defaults = ListInvoicesFilter::default();
        Ok(ListInvoicesFilter {
            status,
            client_id,
            search,
            page: self.page.unwrap_or(defaults.page).max(1),
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceListEntry>,
    pub pagination: Pagination,
}
