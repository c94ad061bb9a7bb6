//! In-memory client fakes for tests.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use super::{
    ClientError, DiagramRecord, DiagramUpload, FetchedImage, IngestionClient, NarrativeClient,
    NarrativeRequest, PlanningClient, PlanningRequest, PlanningResponse, RenderClient,
};
use crate::diagram::DiagramSpec;
use crate::storage::ExportStore;

/// A small valid RGBA PNG.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([20, 40, 200, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

// ---------------------------------------------------------------------------

pub struct FakeRenderClient {
    script: Mutex<VecDeque<(u16, String, Vec<u8>)>>,
    default: Option<(u16, String, Vec<u8>)>,
    urls: Mutex<Vec<String>>,
}

impl FakeRenderClient {
    pub fn always_png() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Some((200, "image/png".into(), png(8, 6))),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch fails with a connection error.
    pub fn unreachable() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: None,
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Replays `(status, content_type, body)` in order, then fails.
    pub fn scripted(script: Vec<(u16, &str, Vec<u8>)>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|(s, ct, body)| (s, ct.to_string(), body))
                    .collect(),
            ),
            default: None,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl RenderClient for FakeRenderClient {
    fn fetch(&self, url: &str) -> Result<FetchedImage, ClientError> {
        self.urls.lock().unwrap().push(url.to_string());
        let next = self.script.lock().unwrap().pop_front();
        match next.or_else(|| self.default.clone()) {
            Some((status, content_type, bytes)) => Ok(FetchedImage {
                status,
                content_type,
                bytes,
            }),
            None => Err(ClientError::Connection(url.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub build_id: String,
    pub diagram_type: String,
    pub description: String,
    pub index: u32,
    pub size: usize,
}

#[derive(Default)]
pub struct RecordingIngestion {
    fail: bool,
    uploads: Mutex<Vec<RecordedUpload>>,
}

impl RecordingIngestion {
    pub fn failing() -> Self {
        Self {
            fail: true,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl IngestionClient for RecordingIngestion {
    fn ingest(&self, upload: &DiagramUpload<'_>) -> Result<String, ClientError> {
        if self.fail {
            return Err(ClientError::Status {
                status: 500,
                body: "ingest down".into(),
            });
        }
        self.uploads.lock().unwrap().push(RecordedUpload {
            build_id: upload.build_id.to_string(),
            diagram_type: upload.diagram_type.to_string(),
            description: upload.description.to_string(),
            index: upload.index,
            size: upload.bytes.len(),
        });
        Ok(format!(
            "diagrams/{}/{}_{}.png",
            upload.build_id, upload.diagram_type, upload.index
        ))
    }
}

/// Ingestion that writes straight into an `ExportStore`, as the builder's
/// endpoint would.
pub struct StoreIngestion(pub ExportStore);

impl IngestionClient for StoreIngestion {
    fn ingest(&self, upload: &DiagramUpload<'_>) -> Result<String, ClientError> {
        self.0
            .ingest(upload.build_id, upload.diagram_type, upload.index, upload.bytes)
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|e| ClientError::Http(e.to_string()))
    }
}

// ---------------------------------------------------------------------------

pub struct FakeNarrative {
    reply: Result<String, u16>,
    requests: Mutex<Vec<NarrativeRequest>>,
}

impl FakeNarrative {
    pub fn markdown(md: &str) -> Self {
        Self {
            reply: Ok(md.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            reply: Err(status),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<NarrativeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl NarrativeClient for FakeNarrative {
    fn generate_markdown(&self, request: &NarrativeRequest) -> Result<String, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(md) if md.trim().is_empty() => Err(ClientError::Empty),
            Ok(md) => Ok(md.clone()),
            Err(status) => Err(ClientError::Status {
                status: *status,
                body: "narrative failed".into(),
            }),
        }
    }
}

/// Planning fake. Optionally ingests a PNG for each listed record into a
/// store before answering, the way the real diagram service would.
pub struct FakePlanning {
    planned: Vec<DiagramSpec>,
    rendered: Vec<DiagramRecord>,
    store: Option<ExportStore>,
    fail: bool,
    requests: Mutex<Vec<PlanningRequest>>,
}

impl FakePlanning {
    pub fn new(planned: Vec<DiagramSpec>, rendered: Vec<DiagramRecord>) -> Self {
        Self {
            planned,
            rendered,
            store: None,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::empty()
        }
    }

    pub fn ingesting_into(mut self, store: ExportStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn requests(&self) -> Vec<PlanningRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn record(diagram_type: &str, description: &str, index: u32) -> DiagramRecord {
    DiagramRecord {
        diagram_type: diagram_type.to_string(),
        description: description.to_string(),
        index,
        position: None,
        path_local: None,
    }
}

/// A record tied to the spec at `position` in the plan.
pub fn placed(diagram_type: &str, description: &str, index: u32, position: usize) -> DiagramRecord {
    DiagramRecord {
        position: Some(position),
        ..record(diagram_type, description, index)
    }
}

impl PlanningClient for FakePlanning {
    fn plan_and_render(&self, request: &PlanningRequest) -> Result<PlanningResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ClientError::Connection("diagram service".into()));
        }
        if let (Some(store), Some(build_id)) = (&self.store, request.build_id.as_deref()) {
            for r in &self.rendered {
                store
                    .ingest(build_id, &r.diagram_type, r.index, &png(12, 8))
                    .map_err(|e| ClientError::Http(e.to_string()))?;
            }
        }
        Ok(PlanningResponse {
            status: "completed".into(),
            diagrams: self.rendered.clone(),
            planned: self.planned.clone(),
            duration: 0.01,
        })
    }
}
