//! PostgreSQL store for invoicing-service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Client, CreateClient, CreateInvoice, CreateInvoiceItem, CreateUser, Invoice, InvoiceItem,
    InvoiceListEntry, InvoiceStatus, ListInvoicesFilter, PlanTier, Subscription,
    SubscriptionStatus, UpdateClient, UpdateDraftInvoice, UpdateUser, User,
    DEFAULT_INVOICE_TEMPLATE,
};
use crate::services::lifecycle::{ensure_draft, invoice_not_found};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::numbering::next_invoice_number;
use crate::services::quota::{self, QuotaAction, Usage};
use crate::services::store::{InvoicePage, InvoiceTotals, Store};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e))
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(db_error("begin transaction"))
    }

    /// Serialise writes for one user for the rest of the transaction.
    async fn lock_user(tx: &mut Transaction<'static, Postgres>, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM users WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error("lock user"))?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))
    }

    async fn active_subscription_in<'e, E>(executor: E, user_id: Uuid) -> Result<Option<Subscription>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Subscription>(
            r#"
            SELECT subscription_id, user_id, plan_type, status, start_date, payment_reference, created_utc, updated_utc
            FROM subscriptions
            WHERE user_id = $1 AND status = 'active'
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(db_error("fetch active subscription"))
    }

    async fn usage_in<'e, E>(executor: E, user_id: Uuid, since: Option<DateTime<Utc>>) -> Result<Usage, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let (invoices, clients) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM invoices WHERE user_id = $1 AND ($2::timestamptz IS NULL OR created_utc >= $2)),
                (SELECT COUNT(*) FROM clients WHERE user_id = $1 AND ($2::timestamptz IS NULL OR created_utc >= $2))
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(executor)
        .await
        .map_err(db_error("count usage"))?;

        Ok(Usage {
            invoices: count(invoices),
            clients: count(clients),
        })
    }

    /// Check the plan quota inside a transaction that holds the user lock.
    async fn enforce_quota(
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
        action: QuotaAction,
    ) -> Result<(), AppError> {
        let active = Self::active_subscription_in(&mut **tx, user_id).await?;
        let (plan, since) = quota::effective_plan(active.as_ref());
        let usage = Self::usage_in(&mut **tx, user_id, since).await?;
        quota::enforce(action, plan, &usage)
    }

    async fn locked_invoice(
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, user_id, client_id, invoice_number, invoice_date, due_date, status,
                subtotal, cgst, sgst, igst, total, notes, terms_conditions, signature_url, created_utc, updated_utc
            FROM invoices
            WHERE invoice_id = $1 AND user_id = $2
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error("lock invoice"))?
        .ok_or_else(invoice_not_found)
    }

    async fn require_owned_client(
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<(), AppError> {
        let owner = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM clients WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error("fetch client owner"))?;

        match owner {
            Some(owner) if owner == user_id => Ok(()),
            Some(_) => Err(AppError::Forbidden(anyhow::anyhow!(
                "Client does not belong to this user"
            ))),
            None => Err(AppError::NotFound(anyhow::anyhow!("Client not found"))),
        }
    }

    async fn insert_items(
        tx: &mut Transaction<'static, Postgres>,
        invoice_id: Uuid,
        items: &[CreateInvoiceItem],
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let row = sqlx::query_as::<_, InvoiceItem>(
                r#"
                INSERT INTO invoice_items (item_id, invoice_id, name, description, quantity, rate, amount, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING item_id, invoice_id, name, description, quantity, rate, amount, sort_order, created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice_id)
            .bind(&item.name)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.rate)
            .bind(item.amount)
            .bind(item.sort_order)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_error("insert invoice item"))?;
            rows.push(row);
        }
        Ok(rows)
    }

    async fn open_subscription(
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
        plan: PlanTier,
        payment_reference: Option<&str>,
    ) -> Result<Subscription, AppError> {
        sqlx::query(
            "UPDATE subscriptions SET status = $2, updated_utc = NOW() WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .bind(SubscriptionStatus::Cancelled.as_str())
        .execute(&mut **tx)
        .await
        .map_err(db_error("cancel active subscription"))?;

        sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (subscription_id, user_id, plan_type, status, start_date, payment_reference)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            RETURNING subscription_id, user_id, plan_type, status, start_date, payment_reference, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(plan.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(payment_reference)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => AppError::Conflict(
                anyhow::anyhow!("A concurrent plan change is in progress"),
            ),
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to open subscription: {}", e)),
        })
    }
}

#[async_trait]
impl Store for Database {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // User Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_user(&self, input: &CreateUser) -> Result<(User, Subscription), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let mut tx = self.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, name, business_name, state, gstin, invoice_prefix, invoice_template)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING user_id, email, name, business_name, state, gstin, invoice_prefix, invoice_template, created_utc, updated_utc
            "#,
        )
        .bind(input.user_id)
        .bind(&input.email)
        .bind(&input.name)
        .bind(&input.business_name)
        .bind(&input.state)
        .bind(&input.gstin)
        .bind(&input.invoice_prefix)
        .bind(DEFAULT_INVOICE_TEMPLATE)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Email '{}' is already registered",
                    input.email
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e)),
        })?;

        let subscription = Self::open_subscription(&mut tx, user.user_id, PlanTier::Free, None).await?;

        tx.commit().await.map_err(db_error("commit user"))?;
        timer.observe_duration();

        info!(user_id = %user.user_id, "User created");

        Ok((user, subscription))
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, name, business_name, state, gstin, invoice_prefix, invoice_template, created_utc, updated_utc
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get user"))?;

        timer.observe_duration();

        Ok(user)
    }

    #[instrument(skip(self, input), fields(user_id = %user_id))]
    async fn update_user(
        &self,
        user_id: Uuid,
        input: &UpdateUser,
    ) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                business_name = COALESCE($3, business_name),
                state = COALESCE($4, state),
                gstin = CASE WHEN $8 THEN $5 ELSE gstin END,
                invoice_prefix = COALESCE($6, invoice_prefix),
                invoice_template = COALESCE($7, invoice_template),
                updated_utc = NOW()
            WHERE user_id = $1
            RETURNING user_id, email, name, business_name, state, gstin, invoice_prefix, invoice_template, created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.business_name)
        .bind(&input.state)
        .bind(input.gstin.clone().flatten())
        .bind(&input.invoice_prefix)
        .bind(&input.invoice_template)
        .bind(input.gstin.is_some())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update user"))?;

        timer.observe_duration();

        Ok(user)
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let mut tx = self.begin().await?;
        Self::lock_user(&mut tx, input.user_id).await?;
        Self::enforce_quota(&mut tx, input.user_id, QuotaAction::CreateClient).await?;

        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (client_id, user_id, name, email, phone, address, city, state, pincode, gstin)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING client_id, user_id, name, email, phone, address, city, state, pincode, gstin, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.pincode)
        .bind(&input.gstin)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create client"))?;

        tx.commit().await.map_err(db_error("commit client"))?;
        timer.observe_duration();

        info!(client_id = %client.client_id, "Client created");

        Ok(client)
    }

    #[instrument(skip(self), fields(client_id = %client_id))]
    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, name, email, phone, address, city, state, pincode, gstin, created_utc, updated_utc
            FROM clients
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get client"))?;

        timer.observe_duration();

        Ok(client)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list_clients(&self, user_id: Uuid) -> Result<Vec<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, name, email, phone, address, city, state, pincode, gstin, created_utc, updated_utc
            FROM clients
            WHERE user_id = $1
            ORDER BY created_utc DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list clients"))?;

        timer.observe_duration();

        Ok(clients)
    }

    #[instrument(skip(self, input), fields(user_id = %user_id, client_id = %client_id))]
    async fn update_client(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET name = COALESCE($3, name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address),
                city = COALESCE($7, city),
                state = COALESCE($8, state),
                pincode = COALESCE($9, pincode),
                gstin = CASE WHEN $11 THEN $10 ELSE gstin END,
                updated_utc = NOW()
            WHERE client_id = $1 AND user_id = $2
            RETURNING client_id, user_id, name, email, phone, address, city, state, pincode, gstin, created_utc, updated_utc
            "#,
        )
        .bind(client_id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.pincode)
        .bind(input.gstin.clone().flatten())
        .bind(input.gstin.is_some())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("update client"))?;

        timer.observe_duration();

        Ok(client)
    }

    #[instrument(skip(self), fields(user_id = %user_id, client_id = %client_id))]
    async fn delete_client(&self, user_id: Uuid, client_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_client"])
            .start_timer();

        let result = sqlx::query("DELETE FROM clients WHERE client_id = $1 AND user_id = $2")
            .bind(client_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "Client has invoices and cannot be deleted"
                    ))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to delete client: {}", e)),
            })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input, items), fields(user_id = %input.user_id, client_id = %input.client_id))]
    async fn create_invoice(
        &self,
        input: &CreateInvoice,
        items: &[CreateInvoiceItem],
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;
        Self::lock_user(&mut tx, input.user_id).await?;
        Self::require_owned_client(&mut tx, input.user_id, input.client_id).await?;
        Self::enforce_quota(&mut tx, input.user_id, QuotaAction::CreateInvoice).await?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                invoice_id, user_id, client_id, invoice_date, due_date, status,
                subtotal, cgst, sgst, igst, total, notes, terms_conditions, signature_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING invoice_id, user_id, client_id, invoice_number, invoice_date, due_date, status,
                subtotal, cgst, sgst, igst, total, notes, terms_conditions, signature_url, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(input.client_id)
        .bind(input.invoice_date)
        .bind(input.due_date)
        .bind(InvoiceStatus::Draft.as_str())
        .bind(input.totals.subtotal)
        .bind(input.totals.cgst)
        .bind(input.totals.sgst)
        .bind(input.totals.igst)
        .bind(input.totals.total)
        .bind(&input.notes)
        .bind(&input.terms_conditions)
        .bind(&input.signature_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create invoice"))?;

        let rows = Self::insert_items(&mut tx, invoice.invoice_id, items).await?;

        tx.commit().await.map_err(db_error("commit invoice"))?;
        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, items = rows.len(), "Draft invoice created");

        Ok((invoice, rows))
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, user_id, client_id, invoice_number, invoice_date, due_date, status,
                subtotal, cgst, sgst, igst, total, notes, terms_conditions, signature_url, created_utc, updated_utc
            FROM invoices
            WHERE invoice_id = $1 AND user_id = $2
            "#,
        )
        .bind(invoice_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get invoice"))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT item_id, invoice_id, name, description, quantity, rate, amount, sort_order, created_utc
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY sort_order
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("get invoice items"))?;

        timer.observe_duration();

        Ok(items)
    }

    #[instrument(skip(self, filter), fields(user_id = %user_id))]
    async fn list_invoices(
        &self,
        user_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<InvoicePage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let status_str = filter.status.map(|s| s.as_str());
        let pattern = filter
            .search
            .as_deref()
            .map(|term| format!("%{}%", term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")));
        let limit = i64::from(filter.limit);
        let offset = i64::try_from(filter.offset()).unwrap_or(i64::MAX);

        let invoices = sqlx::query_as::<_, InvoiceListEntry>(
            r#"
            SELECT i.invoice_id, i.user_id, i.client_id, i.invoice_number, i.invoice_date, i.due_date, i.status,
                i.subtotal, i.cgst, i.sgst, i.igst, i.total, i.notes, i.terms_conditions, i.signature_url,
                i.created_utc, i.updated_utc, c.name AS client_name
            FROM invoices i
            LEFT JOIN clients c ON c.client_id = i.client_id
            WHERE i.user_id = $1
              AND ($2::varchar IS NULL OR i.status = $2)
              AND ($3::uuid IS NULL OR i.client_id = $3)
              AND ($4::varchar IS NULL OR i.invoice_number ILIKE $4 OR c.name ILIKE $4)
            ORDER BY i.created_utc DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(user_id)
        .bind(status_str)
        .bind(filter.client_id)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list invoices"))?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM invoices i
            LEFT JOIN clients c ON c.client_id = i.client_id
            WHERE i.user_id = $1
              AND ($2::varchar IS NULL OR i.status = $2)
              AND ($3::uuid IS NULL OR i.client_id = $3)
              AND ($4::varchar IS NULL OR i.invoice_number ILIKE $4 OR c.name ILIKE $4)
            "#,
        )
        .bind(user_id)
        .bind(status_str)
        .bind(filter.client_id)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("count invoices"))?;

        timer.observe_duration();

        Ok(InvoicePage {
            invoices,
            total: count(total),
        })
    }

    #[instrument(skip(self, input, items), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn update_draft_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateDraftInvoice,
        items: &[CreateInvoiceItem],
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_draft_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;
        let existing = Self::locked_invoice(&mut tx, user_id, invoice_id).await?;
        ensure_draft(&existing, "edited")?;
        Self::require_owned_client(&mut tx, user_id, input.client_id).await?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET client_id = $3,
                invoice_date = $4,
                due_date = $5,
                subtotal = $6,
                cgst = $7,
                sgst = $8,
                igst = $9,
                total = $10,
                notes = $11,
                terms_conditions = $12,
                signature_url = COALESCE($13, signature_url),
                updated_utc = NOW()
            WHERE invoice_id = $1 AND user_id = $2
            RETURNING invoice_id, user_id, client_id, invoice_number, invoice_date, due_date, status,
                subtotal, cgst, sgst, igst, total, notes, terms_conditions, signature_url, created_utc, updated_utc
            "#,
        )
        .bind(invoice_id)
        .bind(user_id)
        .bind(input.client_id)
        .bind(input.invoice_date)
        .bind(input.due_date)
        .bind(input.totals.subtotal)
        .bind(input.totals.cgst)
        .bind(input.totals.sgst)
        .bind(input.totals.igst)
        .bind(input.totals.total)
        .bind(&input.notes)
        .bind(&input.terms_conditions)
        .bind(&input.signature_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("update invoice"))?;

        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete invoice items"))?;

        let rows = Self::insert_items(&mut tx, invoice_id, items).await?;

        tx.commit().await.map_err(db_error("commit invoice update"))?;
        timer.observe_duration();

        info!(items = rows.len(), "Draft invoice replaced");

        Ok((invoice, rows))
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn finalize_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        prefix: &str,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["finalize_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;
        Self::lock_user(&mut tx, user_id).await?;
        let existing = Self::locked_invoice(&mut tx, user_id, invoice_id).await?;
        ensure_draft(&existing, "finalized")?;

        let numbers = sqlx::query_scalar::<_, Option<String>>(
            "SELECT invoice_number FROM invoices WHERE user_id = $1 AND invoice_number IS NOT NULL",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("scan invoice numbers"))?;

        let number = next_invoice_number(numbers.iter().map(Option::as_deref), prefix);

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET invoice_number = $3, status = $4, updated_utc = NOW()
            WHERE invoice_id = $1 AND user_id = $2
            RETURNING invoice_id, user_id, client_id, invoice_number, invoice_date, due_date, status,
                subtotal, cgst, sgst, igst, total, notes, terms_conditions, signature_url, created_utc, updated_utc
            "#,
        )
        .bind(invoice_id)
        .bind(user_id)
        .bind(&number)
        .bind(InvoiceStatus::Finalized.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Invoice number '{}' is already in use", number))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to finalize invoice: {}", e)),
        })?;

        tx.commit().await.map_err(db_error("commit finalize"))?;
        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn cancel_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;
        let existing = Self::locked_invoice(&mut tx, user_id, invoice_id).await?;
        ensure_draft(&existing, "cancelled")?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = $3, updated_utc = NOW()
            WHERE invoice_id = $1 AND user_id = $2
            RETURNING invoice_id, user_id, client_id, invoice_number, invoice_date, due_date, status,
                subtotal, cgst, sgst, igst, total, notes, terms_conditions, signature_url, created_utc, updated_utc
            "#,
        )
        .bind(invoice_id)
        .bind(user_id)
        .bind(InvoiceStatus::Cancelled.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("cancel invoice"))?;

        tx.commit().await.map_err(db_error("commit cancel"))?;
        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        // Items go with the invoice through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM invoices WHERE invoice_id = $1 AND user_id = $2")
            .bind(invoice_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete invoice"))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn invoice_totals(
        &self,
        user_id: Uuid,
        month_start: DateTime<Utc>,
    ) -> Result<InvoiceTotals, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoice_totals"])
            .start_timer();

        let (total_invoices, month_invoices, total_revenue, total_clients) =
            sqlx::query_as::<_, (i64, i64, Decimal, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE created_utc >= $2),
                    COALESCE(SUM(total) FILTER (WHERE status <> 'cancelled'), 0),
                    (SELECT COUNT(*) FROM clients WHERE user_id = $1)
                FROM invoices
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .bind(month_start)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("compute invoice totals"))?;

        timer.observe_duration();

        Ok(InvoiceTotals {
            total_invoices: count(total_invoices),
            month_invoices: count(month_invoices),
            total_clients: count(total_clients),
            total_revenue,
        })
    }

    // -------------------------------------------------------------------------
    // Subscription Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn active_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_subscription"])
            .start_timer();
        let subscription = Self::active_subscription_in(&self.pool, user_id).await?;
        timer.observe_duration();
        Ok(subscription)
    }

    #[instrument(skip(self, payment_reference), fields(user_id = %user_id, plan = %plan))]
    async fn replace_subscription(
        &self,
        user_id: Uuid,
        plan: PlanTier,
        payment_reference: Option<&str>,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replace_subscription"])
            .start_timer();

        let mut tx = self.begin().await?;
        Self::lock_user(&mut tx, user_id).await?;
        let subscription = Self::open_subscription(&mut tx, user_id, plan, payment_reference).await?;
        tx.commit().await.map_err(db_error("commit subscription"))?;

        timer.observe_duration();

        info!(subscription_id = %subscription.subscription_id, "Subscription replaced");

        Ok(subscription)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn usage(&self, user_id: Uuid, since: Option<DateTime<Utc>>) -> Result<Usage, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["usage"])
            .start_timer();
        let usage = Self::usage_in(&self.pool, user_id, since).await?;
        timer.observe_duration();
        Ok(usage)
    }
}
