//! One router per service. Each is self-contained (own state, permissive
//! CORS) so the three can run in one process or in three.
//!
//! NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::{BuilderContext, DiagramContext, NarrativeContext};

/// `POST /generate-doc`
pub fn narrative_router(ctx: NarrativeContext) -> Router {
    Router::new()
        .route("/generate-doc", post(endpoints::narrative::generate_doc))
        .route("/health", get(|| async { endpoints::health::check("narrative") }))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}

/// `POST /generate-uml-image`
pub fn diagram_router(ctx: DiagramContext) -> Router {
    Router::new()
        .route("/generate-uml-image", post(endpoints::diagrams::generate_uml_image))
        .route("/health", get(|| async { endpoints::health::check("diagrams") }))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}

/// Ingestion, orchestration, the planning proxy and artifact downloads.
pub fn builder_router(ctx: BuilderContext) -> Router {
    Router::new()
        .route(
            "/ingest-diagram",
            post(endpoints::ingest::ingest_diagram)
                .layer(DefaultBodyLimit::max(endpoints::ingest::MAX_INGEST_BYTES)),
        )
        .route("/build-document", post(endpoints::build::build_document))
        .route("/generate-uml", post(endpoints::build::generate_uml))
        .route("/download/:filetype/:filename", get(endpoints::download::download))
        .route("/health", get(|| async { endpoints::health::check("builder") }))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}
