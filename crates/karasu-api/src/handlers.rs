//! HTTP request handlers

use crate::models::{
    AddObjectsRequest, ApiRootResponse, CollectionResponse, CollectionsResponse,
    DiscoveryResponse, ErrorResponse, ObjectQuery,
};
use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use karasu_hub::{CollectionService, HubError};
use karasu_store::{Page, QueryFilters};
use std::sync::Arc;
use tracing::debug;

pub const ORG_HEADER: &str = "x-org-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: CollectionService,
    pub title: String,
    pub description: String,
    pub contact: String,
    pub api_root: String,
    pub max_content_length: u64,
}

impl AppState {
    pub fn new(service: CollectionService) -> Self {
        Self {
            service,
            title: "Karasu threat-intelligence hub".to_string(),
            description: "Trust-gated STIX object exchange".to_string(),
            contact: "ops@karasu.invalid".to_string(),
            api_root: "intel".to_string(),
            max_content_length: 10 * 1024 * 1024,
        }
    }
}

/// Error responses carry the taxonomy kind and a reason, nothing internal.
pub struct ApiError(StatusCode, String);

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        let status = match &err {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::AccessDenied(_) => StatusCode::FORBIDDEN,
            HubError::Validation(_) => StatusCode::BAD_REQUEST,
        };
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let title = match self.0 {
            StatusCode::NOT_FOUND => "not found",
            StatusCode::FORBIDDEN => "access denied",
            _ => "bad request",
        };
        (
            self.0,
            Json(ErrorResponse {
                title: title.to_string(),
                description: self.1,
            }),
        )
            .into_response()
    }
}

/// Requester identity from the `X-Org-Id` header.
fn requester(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(ORG_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError(
                StatusCode::BAD_REQUEST,
                format!("missing {ORG_HEADER} header"),
            )
        })
}

fn filters_and_page(query: &ObjectQuery) -> (QueryFilters, Page) {
    let filters = QueryFilters {
        object_type: query.object_type.clone(),
        id: query.id.clone(),
        spec_version: query.spec_version.clone(),
        added_after: query.added_after,
    };
    let mut page = Page::default();
    if let Some(limit) = query.limit {
        page.limit = limit;
    }
    if let Some(offset) = query.offset {
        page.offset = offset;
    }
    (filters, page)
}

fn check_api_root(state: &AppState, api_root: &str) -> Result<(), ApiError> {
    if state.api_root == api_root {
        Ok(())
    } else {
        Err(ApiError(
            StatusCode::NOT_FOUND,
            format!("unknown api root: {api_root}"),
        ))
    }
}

pub async fn discovery(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        title: state.title.clone(),
        description: state.description.clone(),
        contact: state.contact.clone(),
        default: format!("/{}", state.api_root),
        api_roots: vec![format!("/{}", state.api_root)],
    })
}

pub async fn api_root(
    Extension(state): Extension<Arc<AppState>>,
    Path(api_root): Path<String>,
) -> Result<Json<ApiRootResponse>, ApiError> {
    check_api_root(&state, &api_root)?;
    Ok(Json(ApiRootResponse {
        title: state.title.clone(),
        versions: vec![crate::models::TAXII_MEDIA_TYPE.to_string()],
        max_content_length: state.max_content_length,
    }))
}

pub async fn list_collections(
    Extension(state): Extension<Arc<AppState>>,
    Path(api_root): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CollectionsResponse>, ApiError> {
    check_api_root(&state, &api_root)?;
    let org = requester(&headers)?;
    let collections = state.service.list_collections(&org).await?;
    Ok(Json(CollectionsResponse {
        collections: collections
            .iter()
            .map(|c| CollectionResponse::for_requester(c, &org))
            .collect(),
    }))
}

pub async fn get_collection(
    Extension(state): Extension<Arc<AppState>>,
    Path((api_root, collection_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<CollectionResponse>, ApiError> {
    check_api_root(&state, &api_root)?;
    let org = requester(&headers)?;
    let collection = state.service.get_collection(&collection_id, &org).await?;
    Ok(Json(CollectionResponse::for_requester(&collection, &org)))
}

pub async fn get_collection_objects(
    Extension(state): Extension<Arc<AppState>>,
    Path((api_root, collection_id)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<Json<karasu_hub::Envelope>, ApiError> {
    check_api_root(&state, &api_root)?;
    let org = requester(&headers)?;
    let (filters, page) = filters_and_page(&query);
    let envelope = state
        .service
        .get_collection_objects(&collection_id, &org, &filters, &page)
        .await?;
    debug!(collection_id, count = envelope.objects.len(), "served objects page");
    Ok(Json(envelope))
}

pub async fn get_object(
    Extension(state): Extension<Arc<AppState>>,
    Path((api_root, collection_id, object_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<karasu_core::StixObject>, ApiError> {
    check_api_root(&state, &api_root)?;
    let org = requester(&headers)?;
    let object = state
        .service
        .get_object(&collection_id, &object_id, &org)
        .await?;
    Ok(Json(object))
}

pub async fn get_manifest(
    Extension(state): Extension<Arc<AppState>>,
    Path((api_root, collection_id)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<Json<karasu_hub::Manifest>, ApiError> {
    check_api_root(&state, &api_root)?;
    let org = requester(&headers)?;
    let (filters, page) = filters_and_page(&query);
    let manifest = state
        .service
        .get_manifest(&collection_id, &org, &filters, &page)
        .await?;
    Ok(Json(manifest))
}

/// Ingestion. All-success maps to 200, partial failure to 207.
pub async fn add_objects(
    Extension(state): Extension<Arc<AppState>>,
    Path((api_root, collection_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<AddObjectsRequest>,
) -> Result<Response, ApiError> {
    check_api_root(&state, &api_root)?;
    let org = requester(&headers)?;
    let report = state
        .service
        .add_objects(&collection_id, &org, &request.objects)
        .await?;
    let status = if report.is_partial() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)).into_response())
}
