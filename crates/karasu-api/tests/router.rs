//! Router-level tests via tower::ServiceExt::oneshot

use axum::body::Body;
use axum::http::{Request, StatusCode};
use karasu_anonymize::AnonymizationEngine;
use karasu_api::{create_router, AppState};
use karasu_hub::CollectionService;
use karasu_store::{Collection, InMemoryDirectory, NullAuditSink, ObjectStore, Organization};
use karasu_trust::TrustPolicyEngine;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

async fn app() -> (axum::Router, String) {
    let directory = InMemoryDirectory::new();
    directory.register(Organization::new("org-a", "Alpha CERT"));
    let service = CollectionService::new(
        Arc::new(RwLock::new(ObjectStore::new())),
        Arc::new(TrustPolicyEngine::new()),
        Arc::new(AnonymizationEngine::new()),
        Arc::new(directory),
        Arc::new(NullAuditSink),
    );
    let collection = Collection::new("indicators", "", "org-a");
    let collection_id = collection.id.clone();
    service.create_collection(collection).await.unwrap();
    (create_router(Arc::new(AppState::new(service))), collection_id)
}

fn get(uri: &str, org: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(org) = org {
        builder = builder.header("x-org-id", org);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn discovery_is_public() {
    let (app, _) = app().await;
    let response = app.oneshot(get("/taxii2", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_api_root_is_404() {
    let (app, _) = app().await;
    let response = app.oneshot(get("/nope", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn collections_require_org_header() {
    let (app, _) = app().await;
    let response = app
        .clone()
        .oneshot(get("/intel/collections", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/intel/collections", Some("org-a"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_org_is_forbidden() {
    let (app, _) = app().await;
    let response = app
        .oneshot(get("/intel/collections", Some("org-z")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn objects_route_serves_owner() {
    let (app, collection_id) = app().await;
    let uri = format!("/intel/collections/{collection_id}/objects");
    let response = app.oneshot(get(&uri, Some("org-a"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn foreign_collection_read_is_not_found() {
    let (app, _) = app().await;
    let response = app
        .oneshot(get("/intel/collections/nope/objects", Some("org-a")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ingestion_maps_partial_failure_to_207() {
    let (app, collection_id) = app().await;
    let body = serde_json::json!({
        "objects": [
            {
                "type": "malware",
                "id": "malware--6ba7b810-9dad-11d1-80b4-00c04fd430c8",
                "spec_version": "2.1",
                "name": "wiper",
                "is_family": false
            },
            { "type": "indicator", "id": "indicator--6ba7b810-9dad-11d1-80b4-00c04fd430c9", "spec_version": "2.1" }
        ]
    });
    let request = Request::builder()
        .method("POST")
        .uri(format!("/intel/collections/{collection_id}/objects"))
        .header("x-org-id", "org-a")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
}
