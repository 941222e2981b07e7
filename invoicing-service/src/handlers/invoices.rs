use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use uuid::Uuid;

use crate::dtos::{InvoiceListResponse, InvoiceRequest, ListInvoicesQuery, Pagination};
use crate::middleware::UserId;
use crate::startup::AppState;

pub async fn list_invoices(
    State(state): State<AppState>,
    user_id: UserId,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.into_filter()?;
    let page = state.invoices.list(user_id.0, &filter).await?;

    Ok(Json(InvoiceListResponse {
        invoices: page.invoices,
        pagination: Pagination::new(filter.page, filter.limit, page.total),
    }))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    ValidatedJson(req): ValidatedJson<InvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.invoices.create(user_id.0, req.into()).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.invoices.get(user_id.0, invoice_id).await?))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<InvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state
        .invoices
        .update(user_id.0, invoice_id, req.into())
        .await?;
    Ok(Json(detail))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.invoices.delete(user_id.0, invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn finalize_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.invoices.finalize(user_id.0, invoice_id).await?))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.invoices.cancel(user_id.0, invoice_id).await?))
}

pub async fn invoice_stats(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.invoices.stats(user_id.0, Utc::now()).await?))
}

/// Rendered invoice document. Never counts against quota.
pub async fn download_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.invoices.snapshot(user_id.0, invoice_id).await?;
    let document = state.renderer.render(&snapshot)?;

    tracing::info!(
        invoice_id = %invoice_id,
        file_name = %document.file_name,
        bytes = document.body.len(),
        "Invoice rendered"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, document.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", document.file_name),
            ),
        ],
        document.body,
    ))
}
