//! Payment gateway abstraction.
//!
//! Subscription checkout only needs two capabilities from a gateway: create an
//! order for a plan price, and verify the signature returned by checkout. The
//! gateway is built once at startup from configuration.

pub mod mock;
pub mod razorpay;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use service_core::error::AppError;
use sha2::Sha256;
use thiserror::Error;

pub use mock::MockGateway;
pub use razorpay::RazorpayGateway;

type HmacSha256 = Hmac<Sha256>;

/// Error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            GatewayError::ApiError(msg) | GatewayError::NetworkError(msg) => AppError::BadGateway(msg),
        }
    }
}

/// Order to create for a plan checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Amount in paise.
    pub amount: u64,
    pub currency: String,
    pub receipt: String,
    pub notes: serde_json::Value,
}

/// Order created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub order_id: String,
    pub amount: u64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short name used in logs and responses.
    fn name(&self) -> &'static str;

    /// Plan changes are applied at checkout without a payment step.
    fn applies_immediately(&self) -> bool;

    /// Public key id handed to the checkout widget.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError>;

    /// Check the checkout signature for `order_id|payment_id`.
    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, GatewayError>;
}

/// Hex HMAC-SHA256 of `order_id|payment_id`.
pub fn sign_payment(order_id: &str, payment_id: &str, secret: &str) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::NotConfigured("Invalid key length".to_string()))?;
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over `order_id|payment_id`.
pub fn verify_payment_signature(
    order_id: &str,
    payment_id: &str,
    signature: &str,
    secret: &str,
) -> Result<bool, GatewayError> {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return Ok(false);
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::NotConfigured("Invalid key length".to_string()))?;
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    Ok(mac.verify_slice(&expected).is_ok())
}
