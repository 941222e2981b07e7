//! User (business profile) model for invoicing-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_INVOICE_PREFIX: &str = "INV-";
pub const DEFAULT_INVOICE_TEMPLATE: &str = "classic";
pub const INVOICE_TEMPLATES: [&str; 3] = ["classic", "modern", "business"];

/// Business profile of an invoicing user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub business_name: Option<String>,
    /// Business state of registration, compared against the client's state for GST.
    pub state: Option<String>,
    pub gstin: Option<String>,
    pub invoice_prefix: Option<String>,
    pub invoice_template: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Prefix used for finalized invoice numbers. Blank counts as unset.
    pub fn effective_prefix(&self) -> &str {
        match self.invoice_prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => prefix,
            _ => DEFAULT_INVOICE_PREFIX,
        }
    }
}

/// Input for registering a user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub state: Option<String>,
    pub gstin: Option<String>,
    pub invoice_prefix: Option<String>,
}

/// Partial profile update. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub state: Option<String>,
    /// `Some(None)` clears the stored GSTIN.
    pub gstin: Option<Option<String>>,
    pub invoice_prefix: Option<String>,
    pub invoice_template: Option<String>,
}

impl UpdateUser {
    pub fn apply(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = Some(name);
        }
        if let Some(business_name) = self.business_name {
            user.business_name = Some(business_name);
        }
        if let Some(state) = self.state {
            user.state = Some(state);
        }
        if let Some(gstin) = self.gstin {
            user.gstin = gstin;
        }
        if let Some(prefix) = self.invoice_prefix {
            user.invoice_prefix = Some(prefix);
        }
        if let Some(template) = self.invoice_template {
            user.invoice_template = template;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_prefix(prefix: Option<&str>) -> User {
        User {
            user_id: Uuid::new_v4(),
            email: "owner@example.com".to_string(),
            name: None,
            business_name: None,
            state: None,
            gstin: None,
            invoice_prefix: prefix.map(str::to_string),
            invoice_template: DEFAULT_INVOICE_TEMPLATE.to_string(),
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn gstin_can_be_cleared() {
        let mut user = user_with_prefix(None);
        user.gstin = Some("27AAPFU0939F1ZV".to_string());

        UpdateUser::default().apply(&mut user);
        assert_eq!(user.gstin.as_deref(), Some("27AAPFU0939F1ZV"));

        UpdateUser {
            gstin: Some(None),
            ..Default::default()
        }
        .apply(&mut user);
        assert!(user.gstin.is_none());
    }

    #[test]
    fn blank_prefix_falls_back_to_default() {
        assert_eq!(user_with_prefix(None).effective_prefix(), "INV-");
        assert_eq!(user_with_prefix(Some("  ")).effective_prefix(), "INV-");
        assert_eq!(user_with_prefix(Some("ACME/")).effective_prefix(), "ACME/");
    }
}
