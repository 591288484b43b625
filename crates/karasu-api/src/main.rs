//! Protocol server binary

use anyhow::Result;
use karasu_anonymize::AnonymizationEngine;
use karasu_api::{init_tracing, ProtocolServer, ServerConfig};
use karasu_hub::CollectionService;
use karasu_store::{InMemoryDirectory, NullAuditSink, ObjectStore};
use karasu_trust::TrustPolicyEngine;
use std::sync::Arc;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let service = CollectionService::new(
        Arc::new(RwLock::new(ObjectStore::new())),
        Arc::new(TrustPolicyEngine::new()),
        Arc::new(AnonymizationEngine::new()),
        Arc::new(InMemoryDirectory::new()),
        Arc::new(NullAuditSink),
    );

    let config = ServerConfig {
        host: std::env::var("KARASU_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
        port: std::env::var("KARASU_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000),
    };
    ProtocolServer::with_config(config, service).serve().await
}
