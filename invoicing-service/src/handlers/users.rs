use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;
use service_core::extract::ValidatedJson;

use crate::dtos::{RegisterUserRequest, UpdateUserRequest, UserProfileResponse};
use crate::middleware::UserId;
use crate::startup::AppState;

pub async fn register_user(
    State(state): State<AppState>,
    user_id: UserId,
    ValidatedJson(req): ValidatedJson<RegisterUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, subscription) = state.profiles.register(req.into_input(user_id.0)).await?;
    Ok((StatusCode::CREATED, Json(UserProfileResponse { user, subscription })))
}

pub async fn get_profile(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.profiles.get(user_id.0).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user_id: UserId,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.profiles.update(user_id.0, req.into()).await?))
}
