//! Test helper module for invoicing-service integration tests.
//!
//! Spawns the real application on a random port with the mock payment
//! gateway, over the in-memory store or over PostgreSQL when
//! `TEST_DATABASE_URL` is set.

#![allow(dead_code)]

use invoicing_service::config::{DatabaseConfig, InvoicingConfig, PaymentConfig, StoreConfig};
use invoicing_service::services::init_metrics;
use invoicing_service::startup::Application;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::str::FromStr;
use uuid::Uuid;

pub const MAHARASHTRA: &str = "Maharashtra";
pub const KARNATAKA: &str = "Karnataka";

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub client: Client,
}

impl TestApp {
    /// Spawn a new test application on a random port.
    pub async fn spawn() -> Self {
        Self::spawn_with(StoreConfig::Memory).await
    }

    /// Spawn over PostgreSQL. Returns `None` when `TEST_DATABASE_URL` is unset.
    ///
    /// Tests share one database and isolate themselves by registering fresh
    /// users.
    pub async fn spawn_postgres() -> Option<Self> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping PostgreSQL test");
            return None;
        };

        Some(
            Self::spawn_with(StoreConfig::Postgres(DatabaseConfig {
                url: Secret::new(url),
                max_connections: 5,
                min_connections: 1,
                run_migrations: true,
            }))
            .await,
        )
    }

    async fn spawn_with(store: StoreConfig) -> Self {
        init_metrics();

        let config = InvoicingConfig {
            common: CoreConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
            },
            service_name: "invoicing-service-test".to_string(),
            service_version: "9.9.9-test".to_string(),
            log_level: "warn".to_string(),
            otlp_endpoint: None,
            store,
            payment: PaymentConfig::Mock,
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        Self {
            http_address,
            http_port,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_address, path)
    }

    pub async fn get(&self, user_id: Uuid, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .header("X-User-ID", user_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, user_id: Uuid, path: &str) -> Response {
        self.client
            .post(self.url(path))
            .header("X-User-ID", user_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_json(&self, user_id: Uuid, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .header("X-User-ID", user_id.to_string())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put_json(&self, user_id: Uuid, path: &str, body: &Value) -> Response {
        self.client
            .put(self.url(path))
            .header("X-User-ID", user_id.to_string())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, user_id: Uuid, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .header("X-User-ID", user_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Register a business in `state` and return its id.
    pub async fn register_user(&self, state: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        let response = self
            .post_json(
                user_id,
                "/users",
                &json!({
                    "email": format!("{}@example.com", user_id.simple()),
                    "name": "Test Owner",
                    "business_name": "Test Traders",
                    "state": state,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "register_user failed");
        user_id
    }

    /// Create a client in `state` and return its id.
    pub async fn create_client(&self, user_id: Uuid, name: &str, state: &str) -> Uuid {
        let response = self
            .post_json(user_id, "/clients", &json!({ "name": name, "state": state }))
            .await;
        assert_eq!(response.status().as_u16(), 201, "create_client failed");
        let body: Value = response.json().await.expect("Failed to parse JSON");
        id_of(&body, "client_id")
    }

    pub async fn create_invoice(&self, user_id: Uuid, client_id: Uuid, items: Value) -> Response {
        self.post_json(user_id, "/invoices", &invoice_body(client_id, items))
            .await
    }

    /// Create a single-line draft and return its id.
    pub async fn create_simple_invoice(&self, user_id: Uuid, client_id: Uuid) -> Uuid {
        let response = self
            .create_invoice(
                user_id,
                client_id,
                json!([{ "description": "Consulting", "quantity": 1, "rate": 100 }]),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "create_invoice failed");
        let body: Value = response.json().await.expect("Failed to parse JSON");
        id_of(&body, "invoice_id")
    }

    pub async fn upgrade(&self, user_id: Uuid, plan: &str) {
        let response = self
            .post_json(user_id, "/subscriptions/create", &json!({ "planType": plan }))
            .await;
        assert_eq!(response.status().as_u16(), 200, "upgrade failed");
    }
}

pub fn invoice_body(client_id: Uuid, items: Value) -> Value {
    json!({
        "clientId": client_id,
        "invoiceDate": "2025-04-01",
        "dueDate": "2025-04-30",
        "items": items,
        "notes": "Thank you for your business",
        "terms_conditions": "Payment due in 30 days",
    })
}

pub fn id_of(body: &Value, field: &str) -> Uuid {
    body[field]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("missing {} in {}", field, body))
}

/// Money fields serialize as strings; accept numbers too.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("Invalid decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("Invalid decimal number"),
        other => panic!("not a money value: {}", other),
    }
}
