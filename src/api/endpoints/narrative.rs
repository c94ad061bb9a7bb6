//! `POST /generate-doc`: source code + project description → documentation.

use axum::extract::State;
use axum::response::Response;
use axum::Json;

use super::attachment;
use crate::api::error::ApiError;
use crate::api::types::NarrativeContext;
use crate::narrative::GenerateDocRequest;

/// Generate a narrative and return it in `return_format` as an attachment.
pub async fn generate_doc(
    State(ctx): State<NarrativeContext>,
    Json(request): Json<GenerateDocRequest>,
) -> Result<Response, ApiError> {
    let service = ctx.service.clone();
    let doc = tokio::task::spawn_blocking(move || service.handle(&request)).await??;
    tracing::info!(
        filename = %doc.filename,
        size = doc.bytes.len(),
        "Narrative document ready"
    );
    Ok(attachment(doc.content_type, &doc.filename, doc.bytes))
}
