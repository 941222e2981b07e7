use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Request;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";

/// Span for one HTTP request. `user_id` stays empty until a handler extracts
/// [`UserId`].
pub fn request_span<B>(request: &Request<B>) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
        user_id = tracing::field::Empty,
    )
}

/// Caller identity, taken from the `X-User-ID` header set by the trusted
/// front end.
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;

        let user_id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid X-User-ID header")))?;

        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        Ok(UserId(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::span::{Id, Record};
    use tracing::{Instrument, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    #[derive(Clone, Default)]
    struct RecordedFields(Arc<Mutex<Vec<String>>>);

    impl Visit for RecordedFields {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            self.0.lock().unwrap().push(format!("{}={:?}", field.name(), value));
        }
    }

    impl<S: Subscriber> Layer<S> for RecordedFields {
        fn on_record(&self, _id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
            values.record(&mut self.clone());
        }
    }

    async fn extract(header: Option<&str>) -> Result<UserId, AppError> {
        let mut builder = Request::builder().uri("/invoices");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        UserId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn valid_header_is_parsed() {
        let id = Uuid::new_v4();
        let extracted = extract(Some(&id.to_string())).await.unwrap();
        assert_eq!(extracted.0, id);
    }

    #[tokio::test]
    async fn extracted_user_id_is_recorded_on_the_request_span() {
        let recorded = RecordedFields::default();
        let subscriber = tracing_subscriber::registry().with(recorded.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let id = Uuid::new_v4();
        let request = Request::builder()
            .uri("/invoices")
            .header(USER_ID_HEADER, id.to_string())
            .body(())
            .unwrap();
        let span = request_span(&request);
        let (mut parts, _) = request.into_parts();

        UserId::from_request_parts(&mut parts, &())
            .instrument(span)
            .await
            .unwrap();

        let fields = recorded.0.lock().unwrap();
        assert_eq!(fields.as_slice(), [format!("user_id={}", id)]);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized(_))));
        assert!(matches!(
            extract(Some("not-a-uuid")).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
