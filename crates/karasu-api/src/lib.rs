//! # Karasu API
//!
//! TAXII 2.1-shaped HTTP surface over the collection service. Requester
//! identity comes from the `X-Org-Id` header and is resolved through the
//! organization directory; session authentication is an outer concern.

pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use models::*;
pub use routes::create_router;
pub use server::{init_tracing, ProtocolServer, ServerConfig};
