pub mod api;
pub mod build;
pub mod clients;
pub mod config;
pub mod diagram;
pub mod document;
pub mod encoder;
pub mod llm;
pub mod narrative;
pub mod storage;

use axum::Router;
use tracing_subscriber::EnvFilter;

use crate::api::{
    builder_router, diagram_router, narrative_router, start_service, BuilderContext, DiagramContext,
    NarrativeContext, ServiceHandle,
};
use crate::config::{AppConfig, Service};

/// A router ready to be bound, with its listen address.
pub struct ServiceApp {
    pub service: Service,
    pub bind: String,
    pub app: Router,
}

/// Start every configured service and serve until Ctrl-C.
pub fn run() -> Result<(), String> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env().map_err(|e| format!("Invalid configuration: {e}"))?;

    // Blocking HTTP clients must be constructed outside the async runtime.
    let apps = service_apps(&config);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {e}"))?;
    runtime.block_on(async move {
        let handles = start_all(apps).await?;

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to listen for shutdown signal: {e}"))?;
        tracing::info!("Shutting down");

        for handle in handles {
            handle.stop().await;
        }
        Ok(())
    })
}

/// One router per service named in `config.services`.
pub fn service_apps(config: &AppConfig) -> Vec<ServiceApp> {
    config
        .services
        .iter()
        .map(|&service| {
            let (bind, app) = match service {
                Service::Narrative => (
                    &config.narrative_bind,
                    narrative_router(NarrativeContext::from_config(config)),
                ),
                Service::Diagrams => (
                    &config.diagram_bind,
                    diagram_router(DiagramContext::from_config(config)),
                ),
                Service::Builder => (
                    &config.builder_bind,
                    builder_router(BuilderContext::from_config(config)),
                ),
            };
            ServiceApp {
                service,
                bind: bind.clone(),
                app,
            }
        })
        .collect()
}

/// Bind every app. On a bind failure the services already started are
/// stopped before the error is returned.
pub async fn start_all(apps: Vec<ServiceApp>) -> Result<Vec<ServiceHandle>, String> {
    let mut handles = Vec::new();
    for ServiceApp { service, bind, app } in apps {
        match start_service(service, &bind, app).await {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                for handle in handles {
                    handle.stop().await;
                }
                return Err(e);
            }
        }
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned()).unwrap()
    }

    #[test]
    fn one_app_per_configured_service() {
        let apps = service_apps(&config(&[("DOCUAGENT_SERVICES", "builder,narrative")]));
        let services: Vec<_> = apps.iter().map(|a| (a.service, a.bind.as_str())).collect();
        assert_eq!(
            services,
            vec![(Service::Builder, "0.0.0.0:5002"), (Service::Narrative, "0.0.0.0:5000")]
        );
    }

    #[test]
    fn all_services_start_and_answer_health() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("exports");
        let apps = service_apps(&config(&[
            ("NARRATIVE_BIND", "127.0.0.1:0"),
            ("DIAGRAM_BIND", "127.0.0.1:0"),
            ("BUILDER_BIND", "127.0.0.1:0"),
            ("EXPORT_DIR", export.to_str().unwrap()),
        ]));

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let handles = start_all(apps).await.unwrap();
            assert_eq!(handles.len(), 3);
            for handle in &handles {
                let url = format!("http://127.0.0.1:{}/health", handle.session.port);
                let json: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
                assert_eq!(json["service"], handle.session.service);
            }
            for handle in handles {
                handle.stop().await;
            }
        });
    }
}
