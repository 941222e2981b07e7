//! Client model for invoicing-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A customer billed by a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    /// Drives the intra/inter-state GST split.
    pub state: String,
    pub pincode: Option<String>,
    pub gstin: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a client.
#[derive(Debug, Clone)]
pub struct CreateClient {
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: String,
    pub pincode: Option<String>,
    pub gstin: Option<String>,
}

/// Partial client update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateClient {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    /// `Some(None)` clears the stored GSTIN.
    pub gstin: Option<Option<String>>,
}

impl UpdateClient {
    pub fn apply(self, client: &mut Client) {
        if let Some(name) = self.name {
            client.name = name;
        }
        if let Some(email) = self.email {
            client.email = Some(email);
        }
        if let Some(phone) = self.phone {
            client.phone = Some(phone);
        }
        if let Some(address) = self.address {
            client.address = Some(address);
        }
        if let Some(city) = self.city {
            client.city = Some(city);
        }
        if let Some(state) = self.state {
            client.state = state;
        }
        if let Some(pincode) = self.pincode {
            client.pincode = Some(pincode);
        }
        if let Some(gstin) = self.gstin {
            client.gstin = gstin;
        }
    }
}
