use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;
use service_core::extract::ValidatedJson;

use crate::dtos::{CreateSubscriptionRequest, VerifyPaymentRequest};
use crate::middleware::UserId;
use crate::services::subscriptions::PaymentProof;
use crate::startup::AppState;

pub async fn current_subscription(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.subscriptions.current(user_id.0).await?))
}

pub async fn subscription_status(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.subscriptions.status(user_id.0).await?))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    user_id: UserId,
    ValidatedJson(req): ValidatedJson<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let plan = req.plan()?;
    Ok(Json(state.subscriptions.checkout(user_id.0, plan).await?))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    user_id: UserId,
    ValidatedJson(req): ValidatedJson<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let proof = PaymentProof::try_from(req)?;
    Ok(Json(state.subscriptions.verify(user_id.0, proof).await?))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.subscriptions.cancel(user_id.0).await?))
}
