use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use uuid::Uuid;

use crate::dtos::{CreateClientRequest, UpdateClientRequest};
use crate::middleware::UserId;
use crate::startup::AppState;

pub async fn list_clients(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.clients.list(user_id.0).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    user_id: UserId,
    ValidatedJson(req): ValidatedJson<CreateClientRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = state.clients.create(req.into_input(user_id.0)).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(
    State(state): State<AppState>,
    user_id: UserId,
    Path(client_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.clients.get(user_id.0, client_id).await?))
}

pub async fn update_client(
    State(state): State<AppState>,
    user_id: UserId,
    Path(client_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateClientRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = state
        .clients
        .update(user_id.0, client_id, req.into())
        .await?;
    Ok(Json(client))
}

pub async fn delete_client(
    State(state): State<AppState>,
    user_id: UserId,
    Path(client_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.clients.delete(user_id.0, client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
