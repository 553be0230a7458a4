//! Server startup and shutdown logic

use anyhow::{Context, Result};
use axum::Router;
use std::future::IntoFuture;
use std::sync::Arc;
use tether_config::{ServerConfig, TetherConfig};
use tether_core::{ObserverSet, TaskObserver};
use tether_http::{HttpTransport, ReqwestTransport};
use tether_orchestrator::Orchestrator;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{create_app, AppState};
use crate::observer::{LoggingObserver, WebhookObserver};

/// Server application struct
pub struct Server {
    config: TetherConfig,
    server: ServerConfig,
    orchestrator: Orchestrator,
}

impl Server {
    /// Build the orchestrator and its observers with the production transport
    pub fn new(config: TetherConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(
            ReqwestTransport::from_config(&config.http).context("failed to build HTTP transport")?,
        );
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: TetherConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let server = config.server_or_default();

        let mut observers = ObserverSet::new().with(Arc::new(LoggingObserver));
        if let Some(url) = &server.engine_webhook_url {
            observers.push(Arc::new(WebhookObserver::new(transport.clone(), url.clone())));
        }
        let observer: Arc<dyn TaskObserver> = Arc::new(observers);

        let orchestrator = Orchestrator::builder(config.orchestrator.clone(), transport)
            .observer(observer)
            .build();

        Self {
            config,
            server,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn build_app(&self) -> Router {
        create_app(AppState::new(self.orchestrator.clone()), self.server.enable_tracing)
    }

    /// Bind and serve until Ctrl-C or SIGTERM
    pub async fn start(self) -> Result<()> {
        let addr = self.server.socket_address();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        let shutdown = CancellationToken::new();
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                shutdown_signal().await;
                shutdown.cancel();
            }
        });

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires, then stop
    /// the orchestrator. In-flight requests get `shutdown_timeout` to finish.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let app = self.build_app();
        self.log_config_summary(&listener);
        self.orchestrator.start_monitoring();

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future();
        let grace = self.server.shutdown_timeout;

        tokio::select! {
            result = server => result.context("server error")?,
            _ = async {
                shutdown.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                warn!("In-flight requests did not finish within {:?}", grace);
            }
        }

        self.orchestrator.shutdown().await;
        info!("Server shutdown complete");
        Ok(())
    }

    fn log_config_summary(&self, listener: &TcpListener) {
        let orchestrator = &self.config.orchestrator;
        info!("=== Tether Server Configuration ===");
        match listener.local_addr() {
            Ok(addr) => info!("Listening on: {}", addr),
            Err(e) => warn!("Listener address unavailable: {}", e),
        }
        info!("Callback base URL: {}", orchestrator.callback_base_url);
        info!("Heartbeat scan interval: {:?}", orchestrator.heartbeat_scan_interval);
        info!("Max active tasks: {}", orchestrator.max_active_tasks);
        info!(
            "Engine webhook: {}",
            self.server.engine_webhook_url.as_deref().unwrap_or("disabled")
        );
        info!("Tracing: {}", if self.server.enable_tracing { "Enabled" } else { "Disabled" });
        info!("===================================");
    }
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
