//! Build orchestration: one correlated narrative + diagrams run per
//! `build_id`, ending in a saved DOCX and a best-effort PDF.

pub mod assemble;
pub mod orchestrator;

pub use assemble::{assemble_document, diagram_entries, DiagramEntry};
pub use orchestrator::BuildOrchestrator;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clients::ClientError;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Invalid build request: {0}")]
    InvalidRequest(String),

    #[error("Failed to generate document content: {0}")]
    UpstreamGeneration(#[source] ClientError),

    #[error("Document assembly failed: {0}")]
    Assembly(String),

    #[error("Illegal build phase transition {from:?} -> {to:?}")]
    InvalidTransition { from: BuildPhase, to: BuildPhase },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Created,
    NarrativeRequested,
    NarrativeReady,
    NarrativeFailed,
    DiagramsRequested,
    DiagramsReady,
    Assembling,
    Completed,
    AssemblyFailed,
}

impl BuildPhase {
    /// Phases reachable in one step.
    pub fn successors(self) -> &'static [BuildPhase] {
        use BuildPhase::*;
        match self {
            Created => &[NarrativeRequested],
            NarrativeRequested => &[NarrativeReady, NarrativeFailed],
            NarrativeReady => &[DiagramsRequested],
            DiagramsRequested => &[DiagramsReady],
            DiagramsReady => &[Assembling],
            Assembling => &[Completed, AssemblyFailed],
            NarrativeFailed | Completed | AssemblyFailed => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

/// One orchestration run. Only the phase marker changes after creation.
#[derive(Debug)]
pub struct BuildJob {
    pub build_id: String,
    phase: BuildPhase,
    started: Instant,
}

impl BuildJob {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(build_id: String) -> Self {
        Self {
            build_id,
            phase: BuildPhase::Created,
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn advance(&mut self, to: BuildPhase) -> Result<(), BuildError> {
        if !self.phase.successors().contains(&to) {
            return Err(BuildError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::debug!(build_id = %self.build_id, from = ?self.phase, to = ?to, "Build phase");
        self.phase = to;
        Ok(())
    }
}

impl Default for BuildJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of `POST /build-document`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub project_info: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub pages: Option<serde_json::Value>,
    /// System description for diagram planning.
    #[serde(rename = "abstract", default)]
    pub system_description: Option<String>,
    #[serde(default)]
    pub uml_instructions: Option<String>,
}

/// Response of `POST /build-document`. Artifact fields are file names
/// inside the export directory.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BuildReport {
    pub build_id: String,
    pub diagrams_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
}
