//! Narrow client interfaces between the three services.
//!
//! The orchestrator only sees `NarrativeClient` and `PlanningClient`; the
//! renderer only sees `RenderClient` and `IngestionClient`. Blocking HTTP
//! implementations live in `http`; tests substitute in-memory fakes.

#[cfg(test)]
pub mod fake;
pub mod http;

pub use http::{HttpIngestionClient, HttpNarrativeClient, HttpPlanningClient, PlantUmlClient};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagram::DiagramSpec;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Service is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Response decoding error: {0}")]
    Decode(String),

    #[error("Service returned an empty body")]
    Empty,
}

// ═══════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════

/// Body of `POST /generate-doc` as sent by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrativeRequest {
    pub code: String,
    pub project_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub pages: u32,
    pub return_format: String,
}

/// Body of `POST /generate-uml-image`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningRequest {
    #[serde(default)]
    pub build_id: Option<String>,
    #[serde(rename = "abstract", default)]
    pub system_description: String,
    #[serde(default)]
    pub instructions: String,
}

/// One rendered diagram as reported by the diagram service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagramRecord {
    #[serde(rename = "diagramType")]
    pub diagram_type: String,
    pub description: String,
    pub index: u32,
    /// Position of the originating spec in `planned`. Older diagram
    /// services omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(default)]
    pub path_local: Option<String>,
}

/// Response of `POST /generate-uml-image`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningResponse {
    pub status: String,
    #[serde(default)]
    pub diagrams: Vec<DiagramRecord>,
    /// Every planned spec in planner order, including ones that produced no
    /// asset. Older diagram services omit it.
    #[serde(default)]
    pub planned: Vec<DiagramSpec>,
    #[serde(default)]
    pub duration: f64,
}

/// Raw result of a rendering-service fetch. Validation is the caller's job.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub status: u16,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A validated diagram pushed to the ingestion endpoint.
#[derive(Debug, Clone)]
pub struct DiagramUpload<'a> {
    pub build_id: &'a str,
    pub diagram_type: &'a str,
    pub description: &'a str,
    pub index: u32,
    pub bytes: &'a [u8],
}

// ═══════════════════════════════════════════════════════════
// Client traits
// ═══════════════════════════════════════════════════════════

/// Orchestrator → narrative service.
pub trait NarrativeClient: Send + Sync {
    /// Request markdown narrative for a build.
    fn generate_markdown(&self, request: &NarrativeRequest) -> Result<String, ClientError>;
}

/// Orchestrator → diagram service (planning and rendering in one call).
pub trait PlanningClient: Send + Sync {
    fn plan_and_render(&self, request: &PlanningRequest) -> Result<PlanningResponse, ClientError>;
}

/// Renderer → public rendering service.
pub trait RenderClient: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedImage, ClientError>;
}

/// Renderer → ingestion endpoint. Returns the stored path.
pub trait IngestionClient: Send + Sync {
    fn ingest(&self, upload: &DiagramUpload<'_>) -> Result<String, ClientError>;
}

pub(crate) fn map_send_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> ClientError {
    if e.is_connect() {
        ClientError::Connection(base_url.to_string())
    } else if e.is_timeout() {
        ClientError::Timeout(timeout_secs)
    } else {
        ClientError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planning_request_uses_abstract_key() {
        let req = PlanningRequest {
            build_id: Some("b-1".into()),
            system_description: "A library system".into(),
            instructions: String::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["abstract"], "A library system");
        assert_eq!(json["build_id"], "b-1");
    }

    #[test]
    fn planning_request_fields_default() {
        let req: PlanningRequest = serde_json::from_str(r#"{"abstract":"x"}"#).unwrap();
        assert_eq!(req.build_id, None);
        assert_eq!(req.instructions, "");
    }

    #[test]
    fn planning_response_tolerates_missing_planned() {
        let raw = r#"{"status":"completed","diagrams":[
            {"diagramType":"Class_Diagram","description":"classes","index":1,"path_local":"static/x.png"}
        ],"duration":1.5}"#;
        let resp: PlanningResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.diagrams.len(), 1);
        assert_eq!(resp.diagrams[0].diagram_type, "Class_Diagram");
        assert!(resp.planned.is_empty());
    }

    #[test]
    fn narrative_request_skips_absent_instructions() {
        let req = NarrativeRequest {
            code: "fn main() {}".into(),
            project_info: "demo".into(),
            instructions: None,
            pages: 2,
            return_format: "markdown".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("instructions").is_none());
        assert_eq!(json["pages"], 2);
    }

    #[test]
    fn traits_are_object_safe() {
        fn _assert_narrative(_: &dyn NarrativeClient) {}
        fn _assert_planning(_: &dyn PlanningClient) {}
        fn _assert_render(_: &dyn RenderClient) {}
        fn _assert_ingestion(_: &dyn IngestionClient) {}
    }
}
