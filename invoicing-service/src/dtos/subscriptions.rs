use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::models::PlanTier;
use crate::services::subscriptions::PaymentProof;

fn parse_plan(raw: &str) -> Result<PlanTier, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid plan type")))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 1, message = "Plan type is required"))]
    pub plan_type: String,
}

impl CreateSubscriptionRequest {
    pub fn plan(&self) -> Result<PlanTier, AppError> {
        parse_plan(&self.plan_type)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Order id is required"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub payment_id: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub signature: String,
    pub plan_type: String,
}

impl TryFrom<VerifyPaymentRequest> for PaymentProof {
    type Error = AppError;

    fn try_from(req: VerifyPaymentRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            plan: parse_plan(&req.plan_type)?,
            order_id: req.order_id,
            payment_id: req.payment_id,
            signature: req.signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_type_is_case_insensitive() {
        let req = CreateSubscriptionRequest {
            plan_type: "Pro".to_string(),
        };
        assert_eq!(req.plan().unwrap(), PlanTier::Pro);
    }

    #[test]
    fn unknown_plan_is_bad_request() {
        let req = VerifyPaymentRequest {
            order_id: "order_1".to_string(),
            payment_id: "pay_1".to_string(),
            signature: "sig".to_string(),
            plan_type: "platinum".to_string(),
        };
        assert!(matches!(PaymentProof::try_from(req), Err(AppError::BadRequest(_))));
    }
}
