//! Diagram planning and rendering.
//!
//! `planner` asks the LLM which diagrams a system needs; `renderer` turns each
//! planned spec into validated PNGs via the PlantUML server and pushes them
//! to the ingestion endpoint.

pub mod planner;
pub mod renderer;

pub use planner::{parse_plan, DiagramPlanner};
pub use renderer::{extract_blocks, CandidateOutcome, DiagramRenderer, RenderReport};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::{ClientError, DiagramRecord};
use crate::llm::LlmError;
use crate::storage::StorageError;

/// Type used when a diagram type sanitizes to nothing.
pub const FALLBACK_TYPE: &str = "diagram";

#[derive(Error, Debug)]
pub enum DiagramError {
    #[error("Diagram planning failed: {0}")]
    Planning(#[source] LlmError),

    #[error("{0}")]
    BuildId(#[source] StorageError),

    #[error("Diagram source generation failed: {0}")]
    Source(#[source] LlmError),

    #[error("Rendering service request failed: {0}")]
    Fetch(#[source] ClientError),

    #[error("Rendering service returned status {status} with content type '{content_type}'")]
    NotAnImage { status: u16, content_type: String },

    #[error("Failed to persist diagram: {0}")]
    Persist(#[from] std::io::Error),

    #[error("Ingestion failed: {0}")]
    Ingest(#[source] ClientError),
}

/// One diagram the planner decided to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramSpec {
    #[serde(rename = "diagramType")]
    pub diagram_type: String,
    pub description: String,
    #[serde(default = "default_index")]
    pub index: u32,
}

fn default_index() -> u32 {
    1
}

impl DiagramSpec {
    pub fn new(diagram_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            diagram_type: diagram_type.into(),
            description: description.into(),
            index: 1,
        }
    }

    /// Filesystem-safe form of the type.
    pub fn sanitized_type(&self) -> String {
        sanitize_type(&self.diagram_type)
    }
}

/// A rendered, validated and persisted diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramAsset {
    pub build_id: String,
    /// Sanitized type.
    pub diagram_type: String,
    pub description: String,
    /// Candidate number for this type, unique within the build.
    pub index: u32,
    /// 0-based position of the originating spec in the plan.
    pub position: usize,
    pub path_local: PathBuf,
    pub ingested_path: String,
}

impl DiagramAsset {
    pub fn record(&self) -> DiagramRecord {
        DiagramRecord {
            diagram_type: self.diagram_type.clone(),
            description: self.description.clone(),
            index: self.index,
            position: Some(self.position),
            path_local: Some(self.path_local.to_string_lossy().into_owned()),
        }
    }
}

/// Keep `[0-9A-Za-z _-]`, trim, then turn spaces into underscores.
pub fn sanitize_type(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let cleaned = kept.trim().replace(' ', "_");
    if cleaned.is_empty() {
        FALLBACK_TYPE.to_string()
    } else {
        cleaned
    }
}

/// Human title for a sanitized type: separators become spaces, each word
/// capitalized.
pub fn title_case(diagram_type: &str) -> String {
    diagram_type
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
