//! `POST /generate-uml-image`: plan diagrams for a system description and
//! render every planned diagram.

use std::time::Instant;

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::DiagramContext;
use crate::clients::{DiagramRecord, PlanningRequest, PlanningResponse};
use crate::diagram::{DiagramError, DiagramPlanner, DiagramRenderer, RenderReport};
use crate::storage::validate_build_id;

/// Build id used when a caller omits one.
pub const DEFAULT_BUILD_ID: &str = "default";

pub async fn generate_uml_image(
    State(ctx): State<DiagramContext>,
    Json(request): Json<PlanningRequest>,
) -> Result<Json<PlanningResponse>, ApiError> {
    let response = tokio::task::spawn_blocking(move || plan_and_render(&ctx, &request)).await??;
    Ok(Json(response))
}

/// Plan, then render every spec. Only an unsafe `build_id` or a failed
/// planning call is an error; per-diagram failures only shrink `diagrams`.
pub fn plan_and_render(ctx: &DiagramContext, request: &PlanningRequest) -> Result<PlanningResponse, DiagramError> {
    let started = Instant::now();
    let build_id = request
        .build_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(DEFAULT_BUILD_ID);
    tracing::info!(
        build_id,
        abstract_len = request.system_description.len(),
        instructions_len = request.instructions.len(),
        "UML request"
    );
    validate_build_id(build_id).map_err(DiagramError::BuildId)?;

    let specs = DiagramPlanner::new(ctx.llm.as_ref()).plan(&request.system_description, &request.instructions)?;
    let renderer = DiagramRenderer::new(
        ctx.llm.as_ref(),
        ctx.render.as_ref(),
        ctx.ingest.as_ref(),
        &ctx.render_base,
        &ctx.static_dir,
    )
    .with_concurrency(ctx.concurrency);
    let reports = renderer.render_all(&specs, build_id)?;

    let failures: usize = reports.iter().map(|r| r.failures()).sum();
    let response = planning_response(reports, round2(started.elapsed().as_secs_f64()));
    tracing::info!(
        build_id,
        diagrams = response.diagrams.len(),
        failures,
        duration = response.duration,
        "UML complete"
    );
    Ok(response)
}

/// Rendered records, each tagged with its spec's position, plus the plan
/// itself in planner order.
pub fn planning_response(reports: Vec<RenderReport>, duration: f64) -> PlanningResponse {
    let diagrams: Vec<DiagramRecord> = reports
        .iter()
        .flat_map(|report| report.assets().map(|asset| asset.record()))
        .collect();
    PlanningResponse {
        status: "completed".to_string(),
        diagrams,
        planned: reports.into_iter().map(|r| r.spec).collect(),
        duration,
    }
}

fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
