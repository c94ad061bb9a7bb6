//! `GET /download/:filetype/:filename`: serve an assembled artifact.

use axum::extract::{Path, State};
use axum::response::Response;

use super::attachment;
use crate::api::error::ApiError;
use crate::api::types::BuilderContext;
use crate::storage::StorageError;

/// `filetype` is informational; the file is looked up by name alone, inside
/// the export directory only.
pub async fn download(
    State(ctx): State<BuilderContext>,
    Path((filetype, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let store = ctx.store.clone();
    let name = filename.clone();
    let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, StorageError> {
        let path = store.resolve_download(&name)?;
        Ok(std::fs::read(path)?)
    })
    .await?
    .map_err(|e| {
        tracing::info!(%filetype, %filename, error = %e, "Download not served");
        ApiError::NotFound("File not found on server".into())
    })?;

    let content_type = mime_guess::from_path(&filename).first_or_octet_stream();
    tracing::info!(%filetype, %filename, size = bytes.len(), "Serving download");
    Ok(attachment(content_type.essence_str(), &filename, bytes))
}
