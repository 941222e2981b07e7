//! Invoice lifecycle: draft creation, editing, finalization, cancellation,
//! deletion, reads, rendering snapshots and dashboard statistics.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Client, CreateInvoice, CreateInvoiceItem, Invoice, InvoiceItem, ListInvoicesFilter, PlanTier,
    UpdateDraftInvoice, User,
};
use crate::services::metrics::{INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL};
use crate::services::quota::{self, Allowance, QuotaAction};
use crate::services::store::{InvoicePage, Store};
use crate::services::tax::{calculate_gst, LineAmount};

const CURRENCY: &str = "INR";

pub fn invoice_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Invoice not found"))
}

/// Fails with `InvalidState` unless the invoice is still a draft.
pub fn ensure_draft(invoice: &Invoice, action: &str) -> Result<(), AppError> {
    if invoice.status.is_editable() {
        return Ok(());
    }
    Err(AppError::InvalidState(anyhow::anyhow!(
        "Only draft invoices can be {}; this invoice is {}",
        action,
        invoice.status.as_str()
    )))
}

/// One requested line before tax computation.
#[derive(Debug, Clone)]
pub struct DraftItem {
    pub name: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
}

/// Everything needed to create or fully replace a draft.
#[derive(Debug, Clone)]
pub struct InvoiceDraft {
    pub client_id: Uuid,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub items: Vec<DraftItem>,
    pub notes: Option<String>,
    pub terms_conditions: Option<String>,
    pub signature_url: Option<String>,
}

/// Invoice with its items and client name.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub client_name: Option<String>,
    pub items: Vec<InvoiceItem>,
}

/// Fully resolved invoice handed to a renderer.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceSnapshot {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub client: Client,
    pub business: User,
    pub plan: PlanTier,
    pub watermark: bool,
    pub template: String,
}

/// Dashboard statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStats {
    pub total_invoices: u64,
    pub month_invoices: u64,
    pub total_clients: u64,
    pub total_revenue: Decimal,
    pub remaining_invoices: Allowance,
    pub remaining_clients: Allowance,
    pub plan_type: PlanTier,
}

/// Validate requested lines and turn them into priced rows.
pub fn price_items(items: &[DraftItem]) -> Result<(Vec<LineAmount>, Vec<CreateInvoiceItem>), AppError> {
    if items.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invoice must have at least one item"
        )));
    }

    let mut amounts = Vec::with_capacity(items.len());
    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let position = index + 1;
        let description = item.description.trim();
        if description.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Item {} must have a description",
                position
            )));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Item {} quantity must be greater than zero",
                position
            )));
        }
        if item.rate <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Item {} rate must be greater than zero",
                position
            )));
        }

        let line = LineAmount::new(item.quantity, item.rate);
        let name = match item.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => description.to_string(),
        };
        rows.push(CreateInvoiceItem {
            name,
            description: description.to_string(),
            quantity: item.quantity,
            rate: item.rate,
            amount: line.rounded_amount()?,
            sort_order: i32::try_from(index).unwrap_or(i32::MAX),
        });
        amounts.push(line);
    }

    Ok((amounts, rows))
}

/// 00:00 UTC on the first day of `now`'s month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let first = today.with_day(1).unwrap_or(today);
    Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN))
}

#[derive(Clone)]
pub struct InvoiceLifecycle {
    store: Arc<dyn Store>,
}

impl InvoiceLifecycle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))
    }

    /// The client must exist and belong to the caller.
    async fn require_client(&self, user_id: Uuid, client_id: Uuid) -> Result<Client, AppError> {
        match self.store.get_client(client_id).await? {
            Some(client) if client.user_id == user_id => Ok(client),
            Some(_) => Err(AppError::Forbidden(anyhow::anyhow!(
                "Client does not belong to this user"
            ))),
            None => Err(AppError::NotFound(anyhow::anyhow!("Client not found"))),
        }
    }

    async fn require_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.store
            .get_invoice(user_id, invoice_id)
            .await?
            .ok_or_else(invoice_not_found)
    }

    async fn detail(&self, invoice: Invoice, items: Vec<InvoiceItem>) -> Result<InvoiceDetail, AppError> {
        let client_name = self
            .store
            .get_client(invoice.client_id)
            .await?
            .map(|client| client.name);
        Ok(InvoiceDetail {
            invoice,
            client_name,
            items,
        })
    }

    #[instrument(skip(self, draft), fields(user_id = %user_id, client_id = %draft.client_id))]
    pub async fn create(&self, user_id: Uuid, draft: InvoiceDraft) -> Result<InvoiceDetail, AppError> {
        let user = self.require_user(user_id).await?;
        let client = self.require_client(user_id, draft.client_id).await?;
        let (amounts, rows) = price_items(&draft.items)?;
        let totals = calculate_gst(&amounts, user.state.as_deref(), Some(&client.state))?;

        let input = CreateInvoice {
            user_id,
            client_id: client.client_id,
            invoice_date: draft.invoice_date,
            due_date: draft.due_date,
            totals,
            notes: draft.notes,
            terms_conditions: draft.terms_conditions,
            signature_url: draft.signature_url,
        };
        let (invoice, items) = self.store.create_invoice(&input, &rows).await?;

        INVOICES_TOTAL.with_label_values(&["draft"]).inc();
        info!(invoice_id = %invoice.invoice_id, total = %invoice.total, "Invoice drafted");

        Ok(InvoiceDetail {
            invoice,
            client_name: Some(client.name),
            items,
        })
    }

    #[instrument(skip(self, draft), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn update(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        draft: InvoiceDraft,
    ) -> Result<InvoiceDetail, AppError> {
        let existing = self.require_invoice(user_id, invoice_id).await?;
        ensure_draft(&existing, "edited")?;

        let user = self.require_user(user_id).await?;
        let client = self.require_client(user_id, draft.client_id).await?;
        let (amounts, rows) = price_items(&draft.items)?;
        let totals = calculate_gst(&amounts, user.state.as_deref(), Some(&client.state))?;

        let input = UpdateDraftInvoice {
            client_id: client.client_id,
            invoice_date: draft.invoice_date,
            due_date: draft.due_date,
            totals,
            notes: draft.notes,
            terms_conditions: draft.terms_conditions,
            signature_url: draft.signature_url,
        };
        let (invoice, items) = self
            .store
            .update_draft_invoice(user_id, invoice_id, &input, &rows)
            .await?;

        info!(invoice_id = %invoice.invoice_id, total = %invoice.total, "Draft invoice updated");

        Ok(InvoiceDetail {
            invoice,
            client_name: Some(client.name),
            items,
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn finalize(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let user = self.require_user(user_id).await?;
        let invoice = self
            .store
            .finalize_invoice(user_id, invoice_id, user.effective_prefix())
            .await?;

        INVOICES_TOTAL.with_label_values(&["finalized"]).inc();
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[CURRENCY])
            .inc_by(invoice.total.to_f64().unwrap_or_default());
        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number.as_deref().unwrap_or(""),
            "Invoice finalized"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn cancel(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self.store.cancel_invoice(user_id, invoice_id).await?;
        INVOICES_TOTAL.with_label_values(&["cancelled"]).inc();
        info!(invoice_id = %invoice.invoice_id, "Invoice cancelled");
        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn delete(&self, user_id: Uuid, invoice_id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_invoice(user_id, invoice_id).await? {
            return Err(invoice_not_found());
        }
        INVOICES_TOTAL.with_label_values(&["deleted"]).inc();
        info!(invoice_id = %invoice_id, "Invoice deleted");
        Ok(())
    }

    pub async fn get(&self, user_id: Uuid, invoice_id: Uuid) -> Result<InvoiceDetail, AppError> {
        let invoice = self.require_invoice(user_id, invoice_id).await?;
        let items = self.store.get_invoice_items(invoice_id).await?;
        self.detail(invoice, items).await
    }

    pub async fn list(&self, user_id: Uuid, filter: &ListInvoicesFilter) -> Result<InvoicePage, AppError> {
        self.store.list_invoices(user_id, filter).await
    }

    /// Resolve everything a renderer needs. Never touches quota.
    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn snapshot(&self, user_id: Uuid, invoice_id: Uuid) -> Result<InvoiceSnapshot, AppError> {
        let invoice = self.require_invoice(user_id, invoice_id).await?;
        let items = self.store.get_invoice_items(invoice_id).await?;
        let business = self.require_user(user_id).await?;
        let client = self
            .store
            .get_client(invoice.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;
        let active = self.store.active_subscription(user_id).await?;
        let (plan, _) = quota::effective_plan(active.as_ref());

        Ok(InvoiceSnapshot {
            template: business.invoice_template.clone(),
            invoice,
            items,
            client,
            business,
            plan,
            watermark: plan.limits().watermark,
        })
    }

    pub async fn stats(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<InvoiceStats, AppError> {
        self.require_user(user_id).await?;
        let totals = self.store.invoice_totals(user_id, month_start(now)).await?;
        let active = self.store.active_subscription(user_id).await?;
        let (plan, since) = quota::effective_plan(active.as_ref());
        let usage = self.store.usage(user_id, since).await?;

        Ok(InvoiceStats {
            total_invoices: totals.total_invoices,
            month_invoices: totals.month_invoices,
            total_clients: totals.total_clients,
            total_revenue: totals.total_revenue,
            remaining_invoices: quota::remaining(QuotaAction::CreateInvoice, plan, &usage),
            remaining_clients: quota::remaining(QuotaAction::CreateClient, plan, &usage),
            plan_type: plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn item(description: &str, quantity: Decimal, rate: Decimal) -> DraftItem {
        DraftItem {
            name: None,
            description: description.to_string(),
            quantity,
            rate,
        }
    }

    #[test]
    fn empty_item_list_is_rejected() {
        assert!(matches!(price_items(&[]), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn non_positive_quantity_or_rate_is_rejected() {
        assert!(price_items(&[item("Widget", dec!(0), dec!(10))]).is_err());
        assert!(price_items(&[item("Widget", dec!(1), dec!(-5))]).is_err());
        assert!(price_items(&[item("   ", dec!(1), dec!(5))]).is_err());
    }

    #[test]
    fn priced_rows_keep_order_and_round_amounts() {
        let (amounts, rows) = price_items(&[
            item("Design", dec!(1.5), dec!(333.333)),
            item("Hosting", dec!(2), dec!(10)),
        ])
        .unwrap();

        assert_eq!(amounts.len(), 2);
        assert_eq!(rows[0].amount, dec!(500.00));
        assert_eq!(rows[0].name, "Design");
        assert_eq!(rows[1].sort_order, 1);
        assert_eq!(rows[1].amount, dec!(20.00));
    }

    #[test]
    fn month_start_is_midnight_on_the_first() {
        let now = Utc.with_ymd_and_hms(2025, 3, 17, 15, 42, 9).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }
}
