//! Process configuration.
//!
//! Read once at startup from the environment and handed to every component
//! by reference. Nothing below reads the environment after `from_env`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "DocuAgent";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Public PlantUML PNG endpoint. Encoded diagram source is appended as a path segment.
pub const DEFAULT_PLANTUML_SERVER: &str = "http://www.plantuml.com/plantuml/png";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,docuagent=debug"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required for the selected LLM provider")]
    Missing(&'static str),

    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("Unknown LLM provider: {0} (expected \"ollama\" or \"gemini\")")]
    UnknownProvider(String),

    #[error("Unknown service: {0} (expected narrative, diagrams or builder)")]
    UnknownService(String),
}

/// The three HTTP services this binary can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Narrative,
    Diagrams,
    Builder,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Narrative => "narrative",
            Service::Diagrams => "diagrams",
            Service::Builder => "builder",
        }
    }

    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "narrative" => Ok(Service::Narrative),
            "diagrams" | "diagram" | "uml" => Ok(Service::Diagrams),
            "builder" | "docbuilder" => Ok(Service::Builder),
            other => Err(ConfigError::UnknownService(other.to_string())),
        }
    }
}

/// Which language-model back end serves prompts.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    Ollama { base_url: String, model: String },
    Gemini { api_key: String, model: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub services: Vec<Service>,
    pub narrative_bind: String,
    pub diagram_bind: String,
    pub builder_bind: String,
    pub narrative_url: String,
    pub diagram_url: String,
    pub builder_url: String,
    pub llm: LlmProvider,
    pub plantuml_server: String,
    pub export_dir: PathBuf,
    pub static_dir: PathBuf,
    pub saved_docs_dir: PathBuf,
    pub llm_timeout: Duration,
    pub image_timeout: Duration,
    pub ingest_timeout: Duration,
    /// Whole `/generate-uml-image` round trip as seen by the builder: one
    /// planning call plus a source call, fetch and ingest per diagram.
    pub diagram_timeout: Duration,
    pub render_concurrency: usize,
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let services = get("DOCUAGENT_SERVICES", "narrative,diagrams,builder")
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Service::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let llm = match get("LLM_PROVIDER", "ollama").to_ascii_lowercase().as_str() {
            "ollama" => LlmProvider::Ollama {
                base_url: get("OLLAMA_URL", "http://localhost:11434"),
                model: get("OLLAMA_MODEL", "llama3.1"),
            },
            "gemini" => LlmProvider::Gemini {
                api_key: lookup("GEMINI_API_KEY")
                    .filter(|k| !k.trim().is_empty())
                    .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?,
                model: get("GEMINI_MODEL", "gemini-1.5-flash"),
            },
            other => return Err(ConfigError::UnknownProvider(other.to_string())),
        };

        let secs = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            parse_positive(key, lookup(key), default).map(Duration::from_secs)
        };

        Ok(Self {
            services,
            narrative_bind: get("NARRATIVE_BIND", "0.0.0.0:5000"),
            diagram_bind: get("DIAGRAM_BIND", "0.0.0.0:5001"),
            builder_bind: get("BUILDER_BIND", "0.0.0.0:5002"),
            narrative_url: trim_url(get("NARRATIVE_URL", "http://localhost:5000")),
            diagram_url: trim_url(get("DIAGRAM_URL", "http://localhost:5001")),
            builder_url: trim_url(get("BUILDER_URL", "http://localhost:5002")),
            llm,
            plantuml_server: trim_url(get("PLANTUML_SERVER", DEFAULT_PLANTUML_SERVER)),
            export_dir: PathBuf::from(get("EXPORT_DIR", "exports")),
            static_dir: PathBuf::from(get("STATIC_DIR", "static")),
            saved_docs_dir: PathBuf::from(get("SAVED_DOCS_DIR", "saved_docs")),
            llm_timeout: secs("LLM_TIMEOUT_SECS", 120)?,
            image_timeout: secs("IMAGE_TIMEOUT_SECS", 15)?,
            ingest_timeout: secs("INGEST_TIMEOUT_SECS", 10)?,
            diagram_timeout: secs("DIAGRAM_TIMEOUT_SECS", 1800)?,
            render_concurrency: parse_positive("RENDER_CONCURRENCY", lookup("RENDER_CONCURRENCY"), 1)?
                as usize,
        })
    }

    pub fn serves(&self, service: Service) -> bool {
        self.services.contains(&service)
    }

    /// Per-build ingestion root (`<export>/diagrams`).
    pub fn diagrams_dir(&self) -> PathBuf {
        self.export_dir.join("diagrams")
    }
}

fn parse_positive(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidNumber { key, value }),
        },
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
