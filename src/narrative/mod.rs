//! Narrative service: source code + project description → Markdown report,
//! exported in the requested format.

pub mod code_summary;
pub mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::document::{markdown_blocks, write_docx, write_pdf, AssembledDocument, DocumentError};
use crate::llm::{LlmClient, LlmError};
use crate::storage::write_atomic;

pub use code_summary::{summarize, CodeSummary};
pub use prompt::DEFAULT_INSTRUCTIONS;

#[derive(Error, Debug)]
pub enum NarrativeError {
    #[error("Missing code or project_info")]
    MissingInput,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Narrative generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Language model returned an empty narrative")]
    Empty,

    #[error("Export failed: {0}")]
    Export(#[from] DocumentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnFormat {
    Markdown,
    Pdf,
    Docx,
    Text,
}

impl ReturnFormat {
    /// Case-insensitive; absent means `Pdf`.
    pub fn parse(raw: Option<&str>) -> Result<Self, NarrativeError> {
        let Some(raw) = raw else {
            return Ok(Self::Pdf);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "markdown" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "text" => Ok(Self::Text),
            other => Err(NarrativeError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Body of `POST /generate-doc`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateDocRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub project_info: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub return_format: Option<String>,
    /// Number or numeric string; anything else counts as 1.
    #[serde(default)]
    pub pages: Option<serde_json::Value>,
}

/// `pages` as an integer ≥ 1.
pub fn coerce_pages(raw: Option<&serde_json::Value>) -> u32 {
    let n = match raw {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(1),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().unwrap_or(1),
        _ => 1,
    };
    n.clamp(1, u32::MAX as i64) as u32
}

/// A rendered narrative ready to send.
#[derive(Debug, Clone)]
pub struct ExportedDoc {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub struct NarrativeService {
    llm: Arc<dyn LlmClient>,
    saved_docs_dir: PathBuf,
}

impl NarrativeService {
    pub fn new(llm: Arc<dyn LlmClient>, saved_docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            llm,
            saved_docs_dir: saved_docs_dir.into(),
        }
    }

    /// Validate, generate and export in one call. Input and format errors are
    /// reported before the language model is contacted.
    pub fn handle(&self, request: &GenerateDocRequest) -> Result<ExportedDoc, NarrativeError> {
        let format = ReturnFormat::parse(request.return_format.as_deref())?;
        let markdown = self.generate_markdown(request)?;
        self.export(&markdown, format)
    }

    pub fn generate_markdown(&self, request: &GenerateDocRequest) -> Result<String, NarrativeError> {
        let code = non_blank(request.code.as_deref()).ok_or(NarrativeError::MissingInput)?;
        let project_info = non_blank(request.project_info.as_deref()).ok_or(NarrativeError::MissingInput)?;
        let instructions = request.instructions.as_deref().unwrap_or(DEFAULT_INSTRUCTIONS);
        let extension = request.extension.as_deref().unwrap_or(".txt");
        let pages = coerce_pages(request.pages.as_ref());

        let summary = summarize(code, extension);
        tracing::info!(
            pages,
            extension,
            lines = summary.lines,
            model = self.llm.model(),
            "Generating narrative"
        );

        let prompt = prompt::narrative_prompt(code, project_info, instructions, pages, &summary);
        let markdown = self.llm.generate(&prompt, prompt::NARRATIVE_SYSTEM)?;
        let markdown = markdown.trim();
        if markdown.is_empty() {
            return Err(NarrativeError::Empty);
        }
        Ok(markdown.to_string())
    }

    pub fn export(&self, markdown: &str, format: ReturnFormat) -> Result<ExportedDoc, NarrativeError> {
        let doc = || AssembledDocument::with_blocks("Documentation", markdown_blocks(markdown));
        let exported = match format {
            ReturnFormat::Markdown => ExportedDoc {
                filename: "documentation.md".into(),
                content_type: "text/markdown",
                bytes: markdown.as_bytes().to_vec(),
            },
            ReturnFormat::Pdf => ExportedDoc {
                filename: "documentation.pdf".into(),
                content_type: "application/pdf",
                bytes: write_pdf(&doc())?,
            },
            ReturnFormat::Docx => ExportedDoc {
                filename: "documentation.docx".into(),
                content_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                bytes: write_docx(&doc())?,
            },
            ReturnFormat::Text => {
                let filename = format!(
                    "documentation_{}.txt",
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                );
                let path = self.saved_docs_dir.join(&filename);
                write_atomic(&path, markdown.as_bytes())?;
                tracing::info!(path = %path.display(), "Saved text narrative");
                ExportedDoc {
                    filename,
                    content_type: "text/plain",
                    bytes: markdown.as_bytes().to_vec(),
                }
            }
        };
        Ok(exported)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
