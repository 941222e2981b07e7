//! In-memory store for local development and tests.
//!
//! A single mutex guards all state, so every operation is atomic. Timestamps
//! are strictly increasing, so "created since the subscription started" is
//! never ambiguous.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Client, CreateClient, CreateInvoice, CreateInvoiceItem, CreateUser, Invoice, InvoiceItem,
    InvoiceListEntry, InvoiceStatus, ListInvoicesFilter, PlanTier, Subscription,
    SubscriptionStatus, UpdateClient, UpdateDraftInvoice, UpdateUser, User,
    DEFAULT_INVOICE_TEMPLATE,
};
use crate::services::lifecycle::{ensure_draft, invoice_not_found};
use crate::services::numbering::next_invoice_number;
use crate::services::quota::{self, QuotaAction, Usage};
use crate::services::store::{InvoicePage, InvoiceTotals, Store};

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    clients: HashMap<Uuid, Client>,
    invoices: HashMap<Uuid, Invoice>,
    items: HashMap<Uuid, Vec<InvoiceItem>>,
    subscriptions: Vec<Subscription>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn require_user(&self, user_id: Uuid) -> Result<&User, AppError> {
        self.users
            .get(&user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))
    }

    fn active_subscription(&self, user_id: Uuid) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .rev()
            .find(|s| s.user_id == user_id && s.status == SubscriptionStatus::Active)
    }

    fn usage(&self, user_id: Uuid, since: Option<DateTime<Utc>>) -> Usage {
        let in_window = |created: DateTime<Utc>| since.is_none_or(|since| created >= since);
        Usage {
            invoices: self
                .invoices
                .values()
                .filter(|i| i.user_id == user_id && in_window(i.created_utc))
                .count() as u64,
            clients: self
                .clients
                .values()
                .filter(|c| c.user_id == user_id && in_window(c.created_utc))
                .count() as u64,
        }
    }

    fn enforce_quota(&self, user_id: Uuid, action: QuotaAction) -> Result<(), AppError> {
        let (plan, since) = quota::effective_plan(self.active_subscription(user_id));
        quota::enforce(action, plan, &self.usage(user_id, since))
    }

    fn owned_invoice_mut(&mut self, user_id: Uuid, invoice_id: Uuid) -> Result<&mut Invoice, AppError> {
        self.invoices
            .get_mut(&invoice_id)
            .filter(|i| i.user_id == user_id)
            .ok_or_else(invoice_not_found)
    }

    fn require_owned_client(&self, user_id: Uuid, client_id: Uuid) -> Result<(), AppError> {
        match self.clients.get(&client_id) {
            Some(client) if client.user_id == user_id => Ok(()),
            Some(_) => Err(AppError::Forbidden(anyhow::anyhow!(
                "Client does not belong to this user"
            ))),
            None => Err(AppError::NotFound(anyhow::anyhow!("Client not found"))),
        }
    }

    fn write_items(
        &mut self,
        invoice_id: Uuid,
        items: &[CreateInvoiceItem],
        now: DateTime<Utc>,
    ) -> Vec<InvoiceItem> {
        let rows: Vec<InvoiceItem> = items
            .iter()
            .map(|item| InvoiceItem {
                item_id: Uuid::new_v4(),
                invoice_id,
                name: item.name.clone(),
                description: item.description.clone(),
                quantity: item.quantity,
                rate: item.rate,
                amount: item.amount,
                sort_order: item.sort_order,
                created_utc: now,
            })
            .collect();
        self.items.insert(invoice_id, rows.clone());
        rows
    }

    fn open_subscription(
        &mut self,
        user_id: Uuid,
        plan: PlanTier,
        payment_reference: Option<&str>,
    ) -> Subscription {
        let now = self.tick();
        for subscription in self
            .subscriptions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.status == SubscriptionStatus::Active)
        {
            subscription.status = SubscriptionStatus::Cancelled;
            subscription.updated_utc = now;
        }

        let subscription = Subscription {
            subscription_id: Uuid::new_v4(),
            user_id,
            plan_type: plan,
            status: SubscriptionStatus::Active,
            start_date: now,
            payment_reference: payment_reference.map(str::to_string),
            created_utc: now,
            updated_utc: now,
        };
        self.subscriptions.push(subscription.clone());
        subscription
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_user(&self, input: &CreateUser) -> Result<(User, Subscription), AppError> {
        let mut state = self.state.lock().await;

        if state.users.contains_key(&input.user_id) {
            return Err(AppError::Conflict(anyhow::anyhow!("User already exists")));
        }
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&input.email))
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let now = state.tick();
        let user = User {
            user_id: input.user_id,
            email: input.email.clone(),
            name: input.name.clone(),
            business_name: input.business_name.clone(),
            state: input.state.clone(),
            gstin: input.gstin.clone(),
            invoice_prefix: input.invoice_prefix.clone(),
            invoice_template: DEFAULT_INVOICE_TEMPLATE.to_string(),
            created_utc: now,
            updated_utc: now,
        };
        state.users.insert(user.user_id, user.clone());
        let subscription = state.open_subscription(user.user_id, PlanTier::Free, None);

        info!(user_id = %user.user_id, "User created");
        Ok((user, subscription))
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn update_user(
        &self,
        user_id: Uuid,
        input: &UpdateUser,
    ) -> Result<Option<User>, AppError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        Ok(state.users.get_mut(&user_id).map(|user| {
            input.clone().apply(user);
            user.updated_utc = now;
            user.clone()
        }))
    }

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let mut state = self.state.lock().await;
        state.require_user(input.user_id)?;
        state.enforce_quota(input.user_id, QuotaAction::CreateClient)?;

        let now = state.tick();
        let client = Client {
            client_id: Uuid::new_v4(),
            user_id: input.user_id,
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            city: input.city.clone(),
            state: input.state.clone(),
            pincode: input.pincode.clone(),
            gstin: input.gstin.clone(),
            created_utc: now,
            updated_utc: now,
        };
        state.clients.insert(client.client_id, client.clone());

        info!(client_id = %client.client_id, "Client created");
        Ok(client)
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        Ok(self.state.lock().await.clients.get(&client_id).cloned())
    }

    async fn list_clients(&self, user_id: Uuid) -> Result<Vec<Client>, AppError> {
        let state = self.state.lock().await;
        let mut clients: Vec<Client> = state
            .clients
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        clients.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(clients)
    }

    async fn update_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        Ok(state
            .clients
            .get_mut(&client_id)
            .filter(|c| c.user_id == user_id)
            .map(|client| {
                input.clone().apply(client);
                client.updated_utc = now;
                client.clone()
            }))
    }

    async fn delete_client(&self, user_id: Uuid, client_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let owned = state
            .clients
            .get(&client_id)
            .is_some_and(|c| c.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        if state.invoices.values().any(|i| i.client_id == client_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Client has invoices and cannot be deleted"
            )));
        }
        state.clients.remove(&client_id);
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input, items), fields(user_id = %input.user_id, client_id = %input.client_id))]
    async fn create_invoice(
        &self,
        input: &CreateInvoice,
        items: &[CreateInvoiceItem],
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let mut state = self.state.lock().await;
        state.require_user(input.user_id)?;
        state.require_owned_client(input.user_id, input.client_id)?;
        state.enforce_quota(input.user_id, QuotaAction::CreateInvoice)?;

        let now = state.tick();
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            user_id: input.user_id,
            client_id: input.client_id,
            invoice_number: None,
            invoice_date: input.invoice_date,
            due_date: input.due_date,
            status: InvoiceStatus::Draft,
            subtotal: input.totals.subtotal,
            cgst: input.totals.cgst,
            sgst: input.totals.sgst,
            igst: input.totals.igst,
            total: input.totals.total,
            notes: input.notes.clone(),
            terms_conditions: input.terms_conditions.clone(),
            signature_url: input.signature_url.clone(),
            created_utc: now,
            updated_utc: now,
        };
        state.invoices.insert(invoice.invoice_id, invoice.clone());
        let rows = state.write_items(invoice.invoice_id, items, now);

        info!(invoice_id = %invoice.invoice_id, "Draft invoice created");
        Ok((invoice, rows))
    }

    async fn get_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .invoices
            .get(&invoice_id)
            .filter(|i| i.user_id == user_id)
            .cloned())
    }

    async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        let state = self.state.lock().await;
        let mut items = state.items.get(&invoice_id).cloned().unwrap_or_default();
        items.sort_by_key(|i| i.sort_order);
        Ok(items)
    }

    async fn list_invoices(
        &self,
        user_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<InvoicePage, AppError> {
        let state = self.state.lock().await;
        let search = filter.search.as_deref().map(str::to_lowercase);

        let mut matches: Vec<InvoiceListEntry> = state
            .invoices
            .values()
            .filter(|i| i.user_id == user_id)
            .filter(|i| filter.status.is_none_or(|s| i.status == s))
            .filter(|i| filter.client_id.is_none_or(|c| i.client_id == c))
            .map(|i| InvoiceListEntry {
                invoice: i.clone(),
                client_name: state.clients.get(&i.client_id).map(|c| c.name.clone()),
            })
            .filter(|entry| match &search {
                Some(term) => {
                    let number = entry.invoice.invoice_number.as_deref().unwrap_or_default();
                    let client = entry.client_name.as_deref().unwrap_or_default();
                    number.to_lowercase().contains(term) || client.to_lowercase().contains(term)
                }
                None => true,
            })
            .collect();

        matches.sort_by(|a, b| b.invoice.created_utc.cmp(&a.invoice.created_utc));
        let total = matches.len() as u64;
        let invoices = matches
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .collect();

        Ok(InvoicePage { invoices, total })
    }

    #[instrument(skip(self, input, items), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn update_draft_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateDraftInvoice,
        items: &[CreateInvoiceItem],
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let mut state = self.state.lock().await;
        ensure_draft(state.owned_invoice_mut(user_id, invoice_id)?, "edited")?;
        state.require_owned_client(user_id, input.client_id)?;

        let now = state.tick();
        let invoice = state.owned_invoice_mut(user_id, invoice_id)?;
        invoice.client_id = input.client_id;
        invoice.invoice_date = input.invoice_date;
        invoice.due_date = input.due_date;
        invoice.subtotal = input.totals.subtotal;
        invoice.cgst = input.totals.cgst;
        invoice.sgst = input.totals.sgst;
        invoice.igst = input.totals.igst;
        invoice.total = input.totals.total;
        invoice.notes = input.notes.clone();
        invoice.terms_conditions = input.terms_conditions.clone();
        if let Some(url) = &input.signature_url {
            invoice.signature_url = Some(url.clone());
        }
        invoice.updated_utc = now;
        let invoice = invoice.clone();

        let rows = state.write_items(invoice_id, items, now);
        Ok((invoice, rows))
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn finalize_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        prefix: &str,
    ) -> Result<Invoice, AppError> {
        let mut state = self.state.lock().await;
        ensure_draft(state.owned_invoice_mut(user_id, invoice_id)?, "finalized")?;

        let number = next_invoice_number(
            state
                .invoices
                .values()
                .filter(|i| i.user_id == user_id)
                .map(|i| i.invoice_number.as_deref()),
            prefix,
        );

        let now = state.tick();
        let invoice = state.owned_invoice_mut(user_id, invoice_id)?;
        invoice.invoice_number = Some(number);
        invoice.status = InvoiceStatus::Finalized;
        invoice.updated_utc = now;
        Ok(invoice.clone())
    }

    async fn cancel_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let invoice = state.owned_invoice_mut(user_id, invoice_id)?;
        ensure_draft(invoice, "cancelled")?;
        invoice.status = InvoiceStatus::Cancelled;
        invoice.updated_utc = now;
        Ok(invoice.clone())
    }

    async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let owned = state
            .invoices
            .get(&invoice_id)
            .is_some_and(|i| i.user_id == user_id);
        if owned {
            state.invoices.remove(&invoice_id);
            state.items.remove(&invoice_id);
        }
        Ok(owned)
    }

    async fn invoice_totals(
        &self,
        user_id: Uuid,
        month_start: DateTime<Utc>,
    ) -> Result<InvoiceTotals, AppError> {
        let state = self.state.lock().await;
        let mut totals = InvoiceTotals::default();

        for invoice in state.invoices.values().filter(|i| i.user_id == user_id) {
            totals.total_invoices += 1;
            if invoice.created_utc >= month_start {
                totals.month_invoices += 1;
            }
            if invoice.status.counts_as_revenue() {
                totals.total_revenue = totals
                    .total_revenue
                    .checked_add(invoice.total)
                    .unwrap_or(Decimal::MAX);
            }
        }
        totals.total_clients = state.usage(user_id, None).clients;

        Ok(totals)
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    async fn active_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, AppError> {
        Ok(self.state.lock().await.active_subscription(user_id).cloned())
    }

    #[instrument(skip(self, payment_reference), fields(user_id = %user_id, plan = %plan))]
    async fn replace_subscription(
        &self,
        user_id: Uuid,
        plan: PlanTier,
        payment_reference: Option<&str>,
    ) -> Result<Subscription, AppError> {
        let mut state = self.state.lock().await;
        state.require_user(user_id)?;
        Ok(state.open_subscription(user_id, plan, payment_reference))
    }

    async fn usage(&self, user_id: Uuid, since: Option<DateTime<Utc>>) -> Result<Usage, AppError> {
        Ok(self.state.lock().await.usage(user_id, since))
    }
}
