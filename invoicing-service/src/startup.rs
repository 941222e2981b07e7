//! Application startup and lifecycle management.

use crate::config::{InvoicingConfig, PaymentConfig, StoreConfig};
use crate::handlers::{self, clients, invoices, subscriptions, users};
use crate::middleware::{metrics_middleware, request_span};
use crate::services::{
    init_metrics, ClientRegistry, Database, InvoiceLifecycle, InvoiceRenderer, JsonRenderer,
    MemoryStore, MockGateway, PaymentGateway, ProfileService, RazorpayGateway, Store,
    SubscriptionManager,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InvoicingConfig,
    pub store: Arc<dyn Store>,
    pub invoices: InvoiceLifecycle,
    pub clients: ClientRegistry,
    pub profiles: ProfileService,
    pub subscriptions: SubscriptionManager,
    pub renderer: Arc<dyn InvoiceRenderer>,
}

impl AppState {
    pub fn new(
        config: InvoicingConfig,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        renderer: Arc<dyn InvoiceRenderer>,
    ) -> Self {
        Self {
            invoices: InvoiceLifecycle::new(store.clone()),
            clients: ClientRegistry::new(store.clone()),
            profiles: ProfileService::new(store.clone()),
            subscriptions: SubscriptionManager::new(store.clone(), gateway),
            config,
            store,
            renderer,
        }
    }
}

async fn build_store(config: &StoreConfig) -> Result<Arc<dyn Store>, AppError> {
    match config {
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Postgres(database) => {
            let db = Database::new(
                database.url.expose_secret(),
                database.max_connections,
                database.min_connections,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                e
            })?;

            if database.run_migrations {
                db.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;
            }

            Ok(Arc::new(db))
        }
    }
}

fn build_gateway(config: &PaymentConfig) -> Arc<dyn PaymentGateway> {
    match config {
        PaymentConfig::Mock => Arc::new(MockGateway::new()),
        PaymentConfig::Razorpay(razorpay) => {
            let gateway = RazorpayGateway::new(razorpay.clone());
            if !gateway.is_configured() {
                tracing::warn!("Razorpay credentials are empty; paid checkouts will fail");
            }
            Arc::new(gateway)
        }
    }
}

/// Build the HTTP router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/users", post(users::register_user))
        .route(
            "/users/me",
            get(users::get_profile).put(users::update_profile),
        )
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/:id",
            get(clients::get_client)
                .put(clients::update_client)
                .delete(clients::delete_client),
        )
        .route("/invoices/stats", get(invoices::invoice_stats))
        .route(
            "/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route(
            "/invoices/:id",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route("/invoices/:id/finalize", post(invoices::finalize_invoice))
        .route("/invoices/:id/cancel", post(invoices::cancel_invoice))
        .route("/invoices/:id/pdf", get(invoices::download_invoice))
        .route(
            "/subscriptions/current",
            get(subscriptions::current_subscription),
        )
        .route(
            "/subscriptions/status",
            get(subscriptions::subscription_status),
        )
        .route(
            "/subscriptions/create",
            post(subscriptions::create_subscription),
        )
        .route("/subscriptions/verify", post(subscriptions::verify_payment))
        .route(
            "/subscriptions/cancel",
            post(subscriptions::cancel_subscription),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::extract::Request| request_span(request)),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: InvoicingConfig) -> Result<Self, AppError> {
        init_metrics();

        let store = build_store(&config.store).await?;
        let gateway = build_gateway(&config.payment);
        let renderer: Arc<dyn InvoiceRenderer> = Arc::new(JsonRenderer);

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            http_port = http_port,
            store = store.backend(),
            payment_gateway = gateway.name(),
            "Invoicing service listener bound"
        );

        let state = AppState::new(config, store, gateway, renderer);

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = %self.state.config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router(self.state))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
