//! Rendering boundary for invoice documents.
//!
//! Template layout is not handled here. A renderer receives a fully resolved
//! [`InvoiceSnapshot`] and returns bytes plus a content type.

use service_core::error::AppError;

use crate::services::lifecycle::InvoiceSnapshot;

/// A rendered invoice document.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub content_type: &'static str,
    pub file_name: String,
    pub body: Vec<u8>,
}

pub trait InvoiceRenderer: Send + Sync {
    fn render(&self, snapshot: &InvoiceSnapshot) -> Result<RenderedDocument, AppError>;
}

/// Reduce an invoice number to characters that are safe in a file name and
/// inside a quoted `Content-Disposition` parameter.
pub fn file_stem(invoice_number: &str) -> String {
    invoice_number
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Emits the snapshot as JSON for an external PDF renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl InvoiceRenderer for JsonRenderer {
    fn render(&self, snapshot: &InvoiceSnapshot) -> Result<RenderedDocument, AppError> {
        let body = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to render invoice: {}", e)))?;

        let stem = match snapshot.invoice.invoice_number.as_deref() {
            Some(number) => file_stem(number),
            None => format!("draft-{}", snapshot.invoice.invoice_id),
        };

        Ok(RenderedDocument {
            content_type: "application/json",
            file_name: format!("invoice-{stem}.json"),
            body,
        })
    }
}
