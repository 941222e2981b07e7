use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreateUser, Subscription, UpdateUser, User};

/// Invoice numbers end up in file names and headers.
static INVOICE_PREFIX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9/_-]*$").expect("invoice prefix pattern is valid"));

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub state: Option<String>,
    pub gstin: Option<String>,
    #[validate(
        length(max = 20, message = "Invoice prefix must be at most 20 characters"),
        regex(
            path = *INVOICE_PREFIX_PATTERN,
            message = "Invoice prefix may only contain letters, digits, '/', '_' and '-'"
        )
    )]
    pub invoice_prefix: Option<String>,
}

impl RegisterUserRequest {
    pub fn into_input(self, user_id: Uuid) -> CreateUser {
        CreateUser {
            user_id,
            email: self.email,
            name: self.name,
            business_name: self.business_name,
            state: self.state,
            gstin: self.gstin,
            invoice_prefix: self.invoice_prefix,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub business_name: Option<String>,
    pub state: Option<String>,
    pub gstin: Option<String>,
    #[validate(
        length(max = 20, message = "Invoice prefix must be at most 20 characters"),
        regex(
            path = *INVOICE_PREFIX_PATTERN,
            message = "Invoice prefix may only contain letters, digits, '/', '_' and '-'"
        )
    )]
    pub invoice_prefix: Option<String>,
    pub invoice_template: Option<String>,
}

impl From<UpdateUserRequest> for UpdateUser {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            name: req.name,
            business_name: req.business_name,
            state: req.state,
            gstin: req.gstin.map(Some),
            invoice_prefix: req.invoice_prefix,
            invoice_template: req.invoice_template,
        }
    }
}

/// Registration result: the profile plus its opening subscription.
#[derive(Debug, Serialize)]
pub struct UserProfileResponse {
    pub user: User,
    pub subscription: Subscription,
}
