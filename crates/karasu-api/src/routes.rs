//! Route definitions

use crate::handlers::*;
use axum::{
    extract::Extension,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// The protocol router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/taxii2", get(discovery))
        .route("/:api_root", get(api_root))
        .route("/:api_root/collections", get(list_collections))
        .route("/:api_root/collections/:collection_id", get(get_collection))
        .route(
            "/:api_root/collections/:collection_id/objects",
            get(get_collection_objects).post(add_objects),
        )
        .route(
            "/:api_root/collections/:collection_id/objects/:object_id",
            get(get_object),
        )
        .route(
            "/:api_root/collections/:collection_id/manifest",
            get(get_manifest),
        )
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}
