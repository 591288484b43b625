//! HTTP server setup and lifecycle

use crate::handlers::AppState;
use crate::routes::create_router;
use axum::Router;
use karasu_hub::CollectionService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Initialize tracing from `RUST_LOG`, defaulting to info.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

/// The protocol server.
pub struct ProtocolServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ProtocolServer {
    pub fn new(service: CollectionService) -> Self {
        Self::with_config(ServerConfig::default(), service)
    }

    pub fn with_config(config: ServerConfig, service: CollectionService) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(service)),
        }
    }

    pub fn address(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.config.host, self.config.port).parse()?)
    }

    pub fn create_app(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = self.address()?;
        let app = self.create_app();
        info!("starting protocol server on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                error!("server error: {}", e);
                e.into()
            })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install ctrl-c handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
