use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    /// A lifecycle rule was violated, e.g. editing an invoice that is no longer a draft.
    #[error("Invalid state: {0}")]
    InvalidState(anyhow::Error),

    /// A plan limit was reached. `limit` and `current` are surfaced to the caller.
    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        message: String,
        limit: u64,
        current: u64,
    },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) | AppError::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            limit: Option<u64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            current: Option<u64>,
        }

        let status = self.status_code();

        let body = match self {
            AppError::ValidationError(err) => ErrorResponse {
                error: "Validation error".to_string(),
                details: Some(err.to_string()),
                limit: None,
                current: None,
            },
            AppError::QuotaExceeded {
                message,
                limit,
                current,
            } => ErrorResponse {
                error: message,
                details: None,
                limit: Some(limit),
                current: Some(current),
            },
            AppError::BadGateway(msg) => {
                tracing::warn!(error = %msg, "Upstream gateway failure");
                ErrorResponse {
                    error: "Payment gateway unavailable".to_string(),
                    details: None,
                    limit: None,
                    current: None,
                }
            }
            AppError::InternalError(err)
            | AppError::DatabaseError(err)
            | AppError::ConfigError(err) => {
                // Storage and configuration text stays in the logs.
                tracing::error!(error = %err, "Request failed with internal error");
                ErrorResponse {
                    error: "Internal server error".to_string(),
                    details: None,
                    limit: None,
                    current: None,
                }
            }
            AppError::BadRequest(err)
            | AppError::NotFound(err)
            | AppError::Unauthorized(err)
            | AppError::Forbidden(err)
            | AppError::Conflict(err)
            | AppError::InvalidState(err) => ErrorResponse {
                error: err.to_string(),
                details: None,
                limit: None,
                current: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn quota_exceeded_carries_limit_and_current() {
        let err = AppError::QuotaExceeded {
            message: "Invoice limit reached".to_string(),
            limit: 5,
            current: 5,
        };

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Invoice limit reached");
        assert_eq!(body["limit"], 5);
        assert_eq!(body["current"], 5);
    }

    #[tokio::test]
    async fn database_errors_do_not_leak_storage_text() {
        let err = AppError::DatabaseError(anyhow::anyhow!(
            "relation \"invoices\" does not exist"
        ));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn invalid_state_maps_to_bad_request() {
        let err = AppError::InvalidState(anyhow::anyhow!("Only draft invoices can be updated"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
