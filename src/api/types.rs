//! Shared state for the three service routers.
//!
//! Each context is built once at startup from `AppConfig` and cloned into
//! handlers via `State`. Everything inside is `Arc`-shared and immutable.

use std::path::PathBuf;
use std::sync::Arc;

use crate::build::BuildOrchestrator;
use crate::clients::{
    HttpIngestionClient, HttpNarrativeClient, HttpPlanningClient, IngestionClient, PlanningClient,
    PlantUmlClient, RenderClient,
};
use crate::config::AppConfig;
use crate::llm::{self, LlmClient};
use crate::narrative::NarrativeService;
use crate::storage::ExportStore;

// ═══════════════════════════════════════════════════════════
// Narrative service
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct NarrativeContext {
    pub service: Arc<NarrativeService>,
}

impl NarrativeContext {
    pub fn new(service: NarrativeService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let llm = llm::client_for(&config.llm, config.llm_timeout);
        Self::new(NarrativeService::new(llm, config.saved_docs_dir.clone()))
    }
}

// ═══════════════════════════════════════════════════════════
// Diagram service
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct DiagramContext {
    pub llm: Arc<dyn LlmClient>,
    pub render: Arc<dyn RenderClient>,
    pub ingest: Arc<dyn IngestionClient>,
    /// Rendering service base; the encoded source is appended as a path segment.
    pub render_base: String,
    /// Local copies of every validated diagram, under `{build_id}/`.
    pub static_dir: PathBuf,
    pub concurrency: usize,
}

impl DiagramContext {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            llm: llm::client_for(&config.llm, config.llm_timeout),
            render: Arc::new(PlantUmlClient::new(config.image_timeout)),
            ingest: Arc::new(HttpIngestionClient::new(&config.builder_url, config.ingest_timeout)),
            render_base: config.plantuml_server.clone(),
            static_dir: config.static_dir.clone(),
            concurrency: config.render_concurrency,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Builder service
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct BuilderContext {
    pub orchestrator: Arc<BuildOrchestrator>,
    /// Used directly by the `/generate-uml` proxy.
    pub planning: Arc<dyn PlanningClient>,
    pub store: ExportStore,
}

impl BuilderContext {
    pub fn new(orchestrator: BuildOrchestrator, planning: Arc<dyn PlanningClient>) -> Self {
        let store = orchestrator.store().clone();
        Self {
            orchestrator: Arc::new(orchestrator),
            planning,
            store,
        }
    }

    /// The planning client backs both the orchestrator and the
    /// `/generate-uml` proxy, so both wait out a full diagram run.
    pub fn from_config(config: &AppConfig) -> Self {
        let planning: Arc<dyn PlanningClient> =
            Arc::new(HttpPlanningClient::new(&config.diagram_url, config.diagram_timeout));
        let orchestrator = BuildOrchestrator::new(
            Arc::new(HttpNarrativeClient::new(&config.narrative_url, config.llm_timeout)),
            planning.clone(),
            ExportStore::new(config.export_dir.clone()),
        );
        Self::new(orchestrator, planning)
    }
}
