//! Client registry.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{Client, CreateClient, UpdateClient};
use crate::services::store::Store;

static GSTIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z]{1}[1-9A-Z]{1}Z[0-9A-Z]{1}$")
        .expect("GSTIN pattern is valid")
});

/// Fails with `BadRequest` unless `gstin` is a well-formed 15-character GSTIN.
pub fn validate_gstin(gstin: &str) -> Result<(), AppError> {
    if GSTIN_PATTERN.is_match(gstin) {
        Ok(())
    } else {
        Err(AppError::BadRequest(anyhow::anyhow!("Invalid GSTIN format")))
    }
}

/// Trim a GSTIN and treat blank as absent.
pub fn normalize_gstin(gstin: Option<String>) -> Result<Option<String>, AppError> {
    match gstin.map(|g| g.trim().to_string()) {
        Some(g) if g.is_empty() => Ok(None),
        Some(g) => {
            validate_gstin(&g)?;
            Ok(Some(g))
        }
        None => Ok(None),
    }
}

/// Normalize the GSTIN of a partial update. A blank value clears it.
pub fn normalize_gstin_update(
    gstin: Option<Option<String>>,
) -> Result<Option<Option<String>>, AppError> {
    gstin.map(normalize_gstin).transpose()
}

fn required_trimmed(value: Option<String>, message: &'static str) -> Result<Option<String>, AppError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Err(AppError::BadRequest(anyhow::anyhow!(message))),
        other => Ok(other),
    }
}

fn client_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Client not found"))
}

#[derive(Clone)]
pub struct ClientRegistry {
    store: Arc<dyn Store>,
}

impl ClientRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Client>, AppError> {
        self.store.list_clients(user_id).await
    }

    /// Clients owned by someone else read as missing.
    pub async fn get(&self, user_id: Uuid, client_id: Uuid) -> Result<Client, AppError> {
        self.store
            .get_client(client_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(client_not_found)
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create(&self, mut input: CreateClient) -> Result<Client, AppError> {
        input.name = input.name.trim().to_string();
        input.state = input.state.trim().to_string();
        if input.name.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Client name is required")));
        }
        if input.state.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "State is required for GST calculation"
            )));
        }
        input.gstin = normalize_gstin(input.gstin)?;

        let client = self.store.create_client(&input).await?;
        info!(client_id = %client.client_id, "Client registered");
        Ok(client)
    }

    #[instrument(skip(self, input), fields(user_id = %user_id, client_id = %client_id))]
    pub async fn update(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        mut input: UpdateClient,
    ) -> Result<Client, AppError> {
        input.name = required_trimmed(input.name, "Client name cannot be blank")?;
        input.state = required_trimmed(input.state, "State is required for GST calculation")?;
        input.gstin = normalize_gstin_update(input.gstin)?;

        self.store
            .update_client(user_id, client_id, &input)
            .await?
            .ok_or_else(client_not_found)
    }

    #[instrument(skip(self), fields(user_id = %user_id, client_id = %client_id))]
    pub async fn delete(&self, user_id: Uuid, client_id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_client(user_id, client_id).await? {
            return Err(client_not_found());
        }
        info!("Client deleted");
        Ok(())
    }
}
