//! Persistence seam.
//!
//! Every mutating operation is atomic per user. Quota-gated inserts, invoice
//! finalization and subscription replacement run the policy check and the
//! write inside the same per-user critical section.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    Client, CreateClient, CreateInvoice, CreateInvoiceItem, CreateUser, Invoice, InvoiceItem,
    InvoiceListEntry, ListInvoicesFilter, PlanTier, Subscription, UpdateClient,
    UpdateDraftInvoice, UpdateUser, User,
};
use crate::services::quota::Usage;

/// Lifetime and monthly aggregates for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub total_invoices: u64,
    pub month_invoices: u64,
    pub total_clients: u64,
    /// Sum of `total` over non-cancelled invoices.
    pub total_revenue: Decimal,
}

/// One page of invoices plus the unpaged match count.
#[derive(Debug, Clone)]
pub struct InvoicePage {
    pub invoices: Vec<InvoiceListEntry>,
    pub total: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Name reported in logs and readiness checks.
    fn backend(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), AppError>;

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Create the user together with an active free subscription.
    async fn create_user(&self, input: &CreateUser) -> Result<(User, Subscription), AppError>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn update_user(&self, user_id: Uuid, input: &UpdateUser)
        -> Result<Option<User>, AppError>;

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    /// Insert a client if the owner's plan allows another one.
    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError>;

    /// Fetch a client regardless of owner. Callers enforce ownership.
    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError>;

    async fn list_clients(&self, user_id: Uuid) -> Result<Vec<Client>, AppError>;

    async fn update_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError>;

    async fn delete_client(&self, user_id: Uuid, client_id: Uuid) -> Result<bool, AppError>;

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    /// Insert a draft and its items if the owner's plan allows another invoice.
    async fn create_invoice(
        &self,
        input: &CreateInvoice,
        items: &[CreateInvoiceItem],
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError>;

    async fn get_invoice(&self, user_id: Uuid, invoice_id: Uuid)
        -> Result<Option<Invoice>, AppError>;

    async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError>;

    async fn list_invoices(
        &self,
        user_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<InvoicePage, AppError>;

    /// Replace a draft's fields and items. Fails with `InvalidState` unless draft.
    async fn update_draft_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateDraftInvoice,
        items: &[CreateInvoiceItem],
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError>;

    /// Assign the next number under `prefix` and mark the draft finalized.
    async fn finalize_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        prefix: &str,
    ) -> Result<Invoice, AppError>;

    /// Mark a draft cancelled.
    async fn cancel_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError>;

    /// Delete an invoice in any status, with its items.
    async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError>;

    async fn invoice_totals(
        &self,
        user_id: Uuid,
        month_start: DateTime<Utc>,
    ) -> Result<InvoiceTotals, AppError>;

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    async fn active_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, AppError>;

    /// Cancel the active subscription and open a new one starting now.
    async fn replace_subscription(
        &self,
        user_id: Uuid,
        plan: PlanTier,
        payment_reference: Option<&str>,
    ) -> Result<Subscription, AppError>;

    /// Invoices and clients created since `since`, or ever when `None`.
    async fn usage(&self, user_id: Uuid, since: Option<DateTime<Utc>>) -> Result<Usage, AppError>;
}
