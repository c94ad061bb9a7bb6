//! `POST /ingest-diagram`: store one rendered diagram under its build.
//!
//! Presence checks only. Content validation belongs to the renderer.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::BuilderContext;
use crate::diagram::{sanitize_type, FALLBACK_TYPE};

/// Multipart overhead included.
pub const MAX_INGEST_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub path: String,
}

pub async fn ingest_diagram(
    State(ctx): State<BuilderContext>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut build_id: Option<String> = None;
    let mut diagram_type: Option<String> = None;
    let mut index: Option<String> = None;
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read image: {e}")))?;
                image = Some(bytes.to_vec());
            }
            "build_id" | "diagramType" | "index" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read {name}: {e}")))?;
                match name.as_str() {
                    "build_id" => build_id = Some(text),
                    "diagramType" => diagram_type = Some(text),
                    _ => index = Some(text),
                }
            }
            // description and anything else are accepted and ignored
            _ => {}
        }
    }

    let build_id = build_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("build_id is required".into()))?;
    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("no image".into()))?;
    let diagram_type = sanitize_type(diagram_type.as_deref().unwrap_or(FALLBACK_TYPE));
    let index = match index.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => 1,
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| ApiError::BadRequest(format!("index must be a positive integer, got {raw:?}")))?,
    };

    let store = ctx.store.clone();
    let path = tokio::task::spawn_blocking(move || store.ingest(&build_id, &diagram_type, index, &image)).await??;
    Ok(Json(IngestResponse {
        path: path.to_string_lossy().into_owned(),
    }))
}
