//! Domain models for invoicing-service.

mod client;
mod invoice;
mod invoice_item;
mod subscription;
mod user;

pub use client::{Client, CreateClient, UpdateClient};
pub use invoice::{
    CreateInvoice, Invoice, InvoiceListEntry, InvoiceStatus, ListInvoicesFilter, TaxBreakdown,
    UpdateDraftInvoice,
};
pub use invoice_item::{CreateInvoiceItem, InvoiceItem};
pub use subscription::{
    PlanLimits, PlanTier, QuotaPeriod, Subscription, SubscriptionStatus, UnknownVariant,
};
pub use user::{
    CreateUser, UpdateUser, User, DEFAULT_INVOICE_PREFIX, DEFAULT_INVOICE_TEMPLATE, INVOICE_TEMPLATES,
};
