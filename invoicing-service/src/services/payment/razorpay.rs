//! Razorpay Orders API client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::{verify_payment_signature, GatewayError, GatewayOrder, OrderRequest, PaymentGateway};

/// Razorpay credentials and endpoint.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: RazorpayConfig,
}

/// Subset of the order entity returned by `POST /orders`.
#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: u64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Both credentials are set.
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    fn applies_immediately(&self) -> bool {
        false
    }

    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured(
                "Razorpay credentials not configured".to_string(),
            ));
        }

        let url = format!("{}/orders", self.config.api_base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        debug!(status = %status, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body)
                .map_err(|e| GatewayError::ApiError(format!("Unexpected order payload: {}", e)))?;
            info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                status = %order.status,
                "Razorpay order created"
            );
            Ok(GatewayOrder {
                order_id: order.id,
                amount: order.amount,
                currency: order.currency,
            })
        } else {
            let detail = serde_json::from_str::<RazorpayError>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| RazorpayErrorDetail {
                    code: "UNKNOWN".to_string(),
                    description: body.clone(),
                });
            error!(
                code = %detail.code,
                description = %detail.description,
                "Razorpay order creation failed"
            );
            Err(GatewayError::ApiError(format!(
                "Razorpay error: {} - {}",
                detail.code, detail.description
            )))
        }
    }

    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, GatewayError> {
        let is_valid = verify_payment_signature(
            order_id,
            payment_id,
            signature,
            self.config.key_secret.expose_secret(),
        )?;

        if is_valid {
            info!(order_id = %order_id, payment_id = %payment_id, "Payment signature verified");
        } else {
            warn!(order_id = %order_id, payment_id = %payment_id, "Payment signature verification failed");
        }

        Ok(is_valid)
    }
}
