//! Builder endpoints: `POST /build-document` and the `POST /generate-uml`
//! planning proxy.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::diagrams::DEFAULT_BUILD_ID;
use crate::api::error::ApiError;
use crate::api::types::BuilderContext;
use crate::build::{BuildReport, BuildRequest};
use crate::clients::{ClientError, PlanningRequest};

/// Run one build. Narrative and assembly failures come back as explicit
/// errors; diagram failures only lower `diagrams_count`.
pub async fn build_document(
    State(ctx): State<BuilderContext>,
    Json(request): Json<BuildRequest>,
) -> Result<Json<BuildReport>, ApiError> {
    let orchestrator = ctx.orchestrator.clone();
    let report = tokio::task::spawn_blocking(move || orchestrator.run(&request)).await??;
    Ok(Json(report))
}

/// Body of `POST /generate-uml`.
#[derive(Debug, Default, Deserialize)]
pub struct ProxyRequest {
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(rename = "abstract", default)]
    pub system_description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Forward a planning request to the diagram service and relay its answer.
/// Upstream error statuses are passed through with their body.
pub async fn generate_uml(
    State(ctx): State<BuilderContext>,
    Json(body): Json<ProxyRequest>,
) -> Result<Response, ApiError> {
    let request = PlanningRequest {
        build_id: Some(body.build_id.unwrap_or_else(|| DEFAULT_BUILD_ID.to_string())),
        system_description: body.system_description.unwrap_or_default(),
        instructions: body.instructions.unwrap_or_default(),
    };
    let planning = ctx.planning.clone();
    match tokio::task::spawn_blocking(move || planning.plan_and_render(&request)).await? {
        Ok(response) => Ok(Json(response).into_response()),
        Err(ClientError::Status { status, body }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let body = serde_json::from_str::<serde_json::Value>(&body)
                .unwrap_or_else(|_| serde_json::json!({ "error": body }));
            Ok((status, Json(body)).into_response())
        }
        Err(e) => Err(ApiError::Upstream(e.to_string())),
    }
}
