use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;

use super::{
    map_send_error, ClientError, DiagramUpload, FetchedImage, IngestionClient, NarrativeClient,
    NarrativeRequest, PlanningClient, PlanningRequest, PlanningResponse, RenderClient,
};
use crate::storage::diagram_file_name;

fn blocking_client(timeout: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

fn error_for_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

// ---------------------------------------------------------------------------
// Narrative service
// ---------------------------------------------------------------------------

pub struct HttpNarrativeClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpNarrativeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: blocking_client(timeout),
            timeout_secs: timeout.as_secs(),
        }
    }
}

impl NarrativeClient for HttpNarrativeClient {
    fn generate_markdown(&self, request: &NarrativeRequest) -> Result<String, ClientError> {
        let url = format!("{}/generate-doc", self.base_url);
        tracing::debug!(%url, pages = request.pages, "Requesting narrative");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout_secs))?;
        let text = error_for_status(response)?
            .text()
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(ClientError::Empty);
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Diagram service
// ---------------------------------------------------------------------------

pub struct HttpPlanningClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpPlanningClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: blocking_client(timeout),
            timeout_secs: timeout.as_secs(),
        }
    }
}

impl PlanningClient for HttpPlanningClient {
    fn plan_and_render(&self, request: &PlanningRequest) -> Result<PlanningResponse, ClientError> {
        let url = format!("{}/generate-uml-image", self.base_url);
        tracing::debug!(%url, build_id = ?request.build_id, "Requesting diagram plan");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout_secs))?;
        error_for_status(response)?
            .json()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Rendering service
// ---------------------------------------------------------------------------

/// GET client for the PlantUML server. Non-2xx responses are returned, not
/// raised, so the renderer can log status and content type together.
pub struct PlantUmlClient {
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl PlantUmlClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: blocking_client(timeout),
            timeout_secs: timeout.as_secs(),
        }
    }
}

impl RenderClient for PlantUmlClient {
    fn fetch(&self, url: &str) -> Result<FetchedImage, ClientError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| map_send_error(e, url, self.timeout_secs))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response
            .bytes()
            .map_err(|e| ClientError::Decode(e.to_string()))?
            .to_vec();

        Ok(FetchedImage {
            status,
            content_type,
            bytes,
        })
    }
}

// ---------------------------------------------------------------------------
// Ingestion endpoint
// ---------------------------------------------------------------------------

pub struct HttpIngestionClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpIngestionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: blocking_client(timeout),
            timeout_secs: timeout.as_secs(),
        }
    }
}

#[derive(Deserialize)]
struct IngestResponse {
    path: String,
}

impl IngestionClient for HttpIngestionClient {
    fn ingest(&self, upload: &DiagramUpload<'_>) -> Result<String, ClientError> {
        let url = format!("{}/ingest-diagram", self.base_url);
        let image = Part::bytes(upload.bytes.to_vec())
            .file_name(diagram_file_name(upload.diagram_type, upload.index))
            .mime_str("image/png")
            .map_err(|e| ClientError::Http(e.to_string()))?;
        let form = Form::new()
            .text("build_id", upload.build_id.to_string())
            .text("diagramType", upload.diagram_type.to_string())
            .text("description", upload.description.to_string())
            .text("index", upload.index.to_string())
            .part("image", image);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout_secs))?;
        let parsed: IngestResponse = error_for_status(response)?
            .json()
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(parsed.path)
    }
}
