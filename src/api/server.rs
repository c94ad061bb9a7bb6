//! Service lifecycle: bind → spawn background task → return a handle with a
//! shutdown channel.

use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::Service;

/// Metadata for a running service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSession {
    pub service: &'static str,
    pub server_addr: String,
    pub port: u16,
    pub started_at: String,
}

/// Handle to a running service.
pub struct ServiceHandle {
    pub session: ServiceSession,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServiceHandle {
    /// Signal a graceful shutdown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!(service = self.session.service, "Shutdown signal sent");
        }
    }

    /// Shut down and wait for in-flight requests to finish.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(service = self.session.service, "Server task failed: {e}");
            }
        }
    }
}

/// Bind `addr` and serve `app` until the handle is shut down.
pub async fn start_service(service: Service, addr: &str, app: Router) -> Result<ServiceHandle, String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind {} service on {addr}: {e}", service.as_str()))?;

    let local: SocketAddr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    let session = ServiceSession {
        service: service.as_str(),
        server_addr: local.to_string(),
        port: local.port(),
        started_at: chrono::Utc::now().to_rfc3339(),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let name = service.as_str();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!(service = name, "Received shutdown signal");
        };

        tracing::info!(service = name, addr = %local, "Service started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!(service = name, "Server error: {e}");
        }

        tracing::info!(service = name, "Service stopped");
    });

    Ok(ServiceHandle {
        session,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
