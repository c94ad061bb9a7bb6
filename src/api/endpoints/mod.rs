//! Endpoint handlers, one module per service surface.
//!
//! Handlers stay thin: blocking work (LLM calls, HTTP fetches, document
//! writing) runs on `spawn_blocking` and errors map through `ApiError`.

pub mod build;
pub mod diagrams;
pub mod download;
pub mod health;
pub mod ingest;
pub mod narrative;

use axum::http::header;
use axum::response::{IntoResponse, Response};

/// Binary body served as a named download.
pub(crate) fn attachment(content_type: &str, filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
