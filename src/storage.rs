//! On-disk layout for diagrams and exported artifacts.
//!
//! ```text
//! {export_dir}/
//!   diagrams/{build_id}/{type}_{index}.png   ingested diagram assets
//!   combined_{ts}_{build}.docx|pdf           assembled artifacts
//! ```
//!
//! `{type}_{index}.png` is the contract shared by the renderer, the ingestion
//! endpoint and document assembly; only `diagram_file_name` produces it.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("build_id is required")]
    MissingBuildId,

    #[error("Invalid build_id: {0}")]
    InvalidBuildId(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// `{type}_{index}.png`
pub fn diagram_file_name(diagram_type: &str, index: u32) -> String {
    format!("{diagram_type}_{index}.png")
}

/// Build ids become directory names, so they are restricted to
/// `[A-Za-z0-9_-]`.
pub fn validate_build_id(build_id: &str) -> Result<(), StorageError> {
    if build_id.is_empty() {
        return Err(StorageError::MissingBuildId);
    }
    let ok = build_id.len() <= 128
        && build_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidBuildId(build_id.to_string()))
    }
}

/// Write via a temp file in the target directory, then rename over `path`.
/// Readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Owner of the export directory tree.
#[derive(Debug, Clone)]
pub struct ExportStore {
    export_dir: PathBuf,
    diagrams_dir: PathBuf,
}

impl ExportStore {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        let export_dir = export_dir.into();
        let diagrams_dir = export_dir.join("diagrams");
        Self {
            export_dir,
            diagrams_dir,
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn diagrams_dir(&self) -> &Path {
        &self.diagrams_dir
    }

    pub fn build_dir(&self, build_id: &str) -> PathBuf {
        self.diagrams_dir.join(build_id)
    }

    pub fn diagram_path(&self, build_id: &str, diagram_type: &str, index: u32) -> PathBuf {
        self.build_dir(build_id)
            .join(diagram_file_name(diagram_type, index))
    }

    /// Store an ingested diagram. The build directory is created on first
    /// use; an existing file at the same key is replaced.
    pub fn ingest(
        &self,
        build_id: &str,
        diagram_type: &str,
        index: u32,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        validate_build_id(build_id)?;
        let path = self.diagram_path(build_id, diagram_type, index);
        write_atomic(&path, bytes)?;
        tracing::info!(
            build_id,
            diagram_type,
            index,
            size = bytes.len(),
            path = %path.display(),
            "Diagram ingested"
        );
        Ok(path)
    }

    /// Bytes of a stored diagram, or `None` if nothing was ingested under
    /// that key.
    pub fn load_diagram(&self, build_id: &str, diagram_type: &str, index: u32) -> Option<Vec<u8>> {
        let path = self.diagram_path(build_id, diagram_type, index);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Diagram unreadable");
                }
                None
            }
        }
    }

    /// Write an assembled artifact into the export directory.
    pub fn save_artifact(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        check_file_name(filename)?;
        let path = self.export_dir.join(filename);
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// Resolve a download request to a file directly inside the export
    /// directory.
    pub fn resolve_download(&self, filename: &str) -> Result<PathBuf, StorageError> {
        check_file_name(filename)?;
        let path = self.export_dir.join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StorageError::NotFound(filename.to_string()))
        }
    }
}

fn check_file_name(filename: &str) -> Result<(), StorageError> {
    let bad = filename.is_empty()
        || filename == "."
        || filename.contains("..")
        || filename.contains(['/', '\\', '\0']);
    if bad {
        Err(StorageError::InvalidFileName(filename.to_string()))
    } else {
        Ok(())
    }
}
