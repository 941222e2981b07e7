//! Mock gateway for development and tests.
//!
//! Plan changes apply at checkout. Orders are minted locally and signatures
//! are checked against a local secret.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use tracing::info;
use uuid::Uuid;

use super::{verify_payment_signature, GatewayError, GatewayOrder, OrderRequest, PaymentGateway};

pub const MOCK_KEY_ID: &str = "rzp_mock";
pub const MOCK_KEY_SECRET: &str = "mock_secret";

pub struct MockGateway {
    key_secret: Secret<String>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_secret(MOCK_KEY_SECRET)
    }

    pub fn with_secret(secret: &str) -> Self {
        Self {
            key_secret: Secret::new(secret.to_string()),
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn applies_immediately(&self) -> bool {
        true
    }

    fn key_id(&self) -> &str {
        MOCK_KEY_ID
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        let order_id = format!("order_mock_{}", Uuid::new_v4().simple());
        info!(order_id = %order_id, amount = request.amount, "Mock order created");
        Ok(GatewayOrder {
            order_id,
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }

    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, GatewayError> {
        verify_payment_signature(order_id, payment_id, signature, self.key_secret.expose_secret())
    }
}
