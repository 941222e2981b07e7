use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreateClient, UpdateClient};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, message = "Client name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    #[validate(length(min = 1, message = "Client state is required"))]
    pub state: String,
    pub pincode: Option<String>,
    pub gstin: Option<String>,
}

impl CreateClientRequest {
    pub fn into_input(self, user_id: Uuid) -> CreateClient {
        CreateClient {
            user_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            city: self.city,
            state: self.state,
            pincode: self.pincode,
            gstin: self.gstin,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, message = "Client name must not be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    #[validate(length(min = 1, message = "Client state must not be empty"))]
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub gstin: Option<String>,
}

impl From<UpdateClientRequest> for UpdateClient {
    fn from(req: UpdateClientRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
            phone: req.phone,
            address: req.address,
            city: req.city,
            state: req.state,
            pincode: req.pincode,
            gstin: req.gstin.map(Some),
        }
    }
}
