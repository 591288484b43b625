//! Wire models for the protocol surface

use karasu_store::Collection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TAXII_MEDIA_TYPE: &str = "application/taxii+json;version=2.1";

/// Discovery body served at `/taxii2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub title: String,
    pub description: String,
    pub contact: String,
    pub default: String,
    pub api_roots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRootResponse {
    pub title: String,
    pub versions: Vec<String>,
    pub max_content_length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsResponse {
    pub collections: Vec<CollectionResponse>,
}

/// Collection metadata with the capabilities resolved for the requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub can_read: bool,
    pub can_write: bool,
    pub media_types: Vec<String>,
}

impl CollectionResponse {
    pub fn for_requester(collection: &Collection, org: &str) -> Self {
        Self {
            id: collection.id.clone(),
            title: collection.title.clone(),
            description: collection.description.clone(),
            can_read: collection.readable_by(org),
            can_write: collection.writable_by(org),
            media_types: collection.media_types.clone(),
        }
    }
}

/// Query parameters shared by the objects and manifest endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectQuery {
    pub added_after: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    pub id: Option<String>,
    pub spec_version: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Ingestion request body.
#[derive(Debug, Clone, Deserialize)]
pub struct AddObjectsRequest {
    pub objects: Vec<Value>,
}

/// Taxonomy-kind error body; internal detail is never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub title: String,
    pub description: String,
}
