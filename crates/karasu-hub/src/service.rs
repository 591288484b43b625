//! The collection service
//!
//! Serving rules: collection read capability gates visibility (owner bypass
//! always applies, denial is reported as not-found); for cross-organization
//! reads the trust policy engine resolves the anonymization level and every
//! served object passes through the anonymization engine first. One
//! `AnonymizationContext` per request.

use crate::ingest::{self, IngestFailure, IngestReport};
use crate::HubError;
use chrono::{DateTime, Utc};
use karasu_anonymize::{
    AnonymizationContext, AnonymizationEngine, AnonymizationLevel, AnonymizeOptions,
};
use karasu_core::{StixObject, STIX_MEDIA_TYPE};
use karasu_store::{
    AuditEntry, AuditOperation, AuditSink, Collection, ObjectStore, OrganizationDirectory, Page,
    QueryFilters, StoredObject,
};
use karasu_trust::TrustPolicyEngine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Paged object envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub objects: Vec<StixObject>,
    pub more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<usize>,
}

/// Paged manifest envelope. Manifest entries are never anonymized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub objects: Vec<ManifestEntry>,
    pub more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub date_added: DateTime<Utc>,
    pub version: DateTime<Utc>,
    pub media_type: String,
}

impl ManifestEntry {
    fn from_stored(stored: &StoredObject) -> Self {
        Self {
            id: stored.object.id.clone(),
            date_added: stored.date_added,
            version: stored.version,
            media_type: STIX_MEDIA_TYPE.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct CollectionService {
    store: Arc<RwLock<ObjectStore>>,
    trust: Arc<TrustPolicyEngine>,
    anonymizer: Arc<AnonymizationEngine>,
    directory: Arc<dyn OrganizationDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl CollectionService {
    pub fn new(
        store: Arc<RwLock<ObjectStore>>,
        trust: Arc<TrustPolicyEngine>,
        anonymizer: Arc<AnonymizationEngine>,
        directory: Arc<dyn OrganizationDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            trust,
            anonymizer,
            directory,
            audit,
        }
    }

    pub fn store(&self) -> Arc<RwLock<ObjectStore>> {
        Arc::clone(&self.store)
    }

    fn require_org(&self, requester: &str) -> Result<String, HubError> {
        self.directory
            .resolve(requester)
            .map(|org| org.id)
            .ok_or_else(|| HubError::AccessDenied(format!("unknown organization: {requester}")))
    }

    pub async fn create_collection(&self, collection: Collection) -> Result<(), HubError> {
        self.store
            .write()
            .await
            .create_collection(collection)
            .map_err(|e| HubError::Validation(vec![e.to_string()]))
    }

    /// Collections owned by or explicitly readable by the requester.
    pub async fn list_collections(&self, requester: &str) -> Result<Vec<Collection>, HubError> {
        let org = self.require_org(requester)?;
        Ok(self.store.read().await.collections_for(&org))
    }

    pub async fn get_collection(
        &self,
        collection_id: &str,
        requester: &str,
    ) -> Result<Collection, HubError> {
        let org = self.require_org(requester)?;
        let store = self.store.read().await;
        match store.collection(collection_id) {
            Some(collection) if collection.readable_by(&org) => Ok(collection.clone()),
            // Denied reads are indistinguishable from missing collections.
            _ => Err(HubError::NotFound(format!("collection {collection_id}"))),
        }
    }

    /// Paged, filtered objects with trust-resolved anonymization for
    /// cross-organization requesters. An object whose anonymization fails is
    /// excluded from the page, never served malformed.
    pub async fn get_collection_objects(
        &self,
        collection_id: &str,
        requester: &str,
        filters: &QueryFilters,
        page: &Page,
    ) -> Result<Envelope, HubError> {
        let org = self.require_org(requester)?;
        let store = self.store.read().await;
        let collection = match store.collection(collection_id) {
            Some(collection) if collection.readable_by(&org) => collection.clone(),
            _ => return Err(HubError::NotFound(format!("collection {collection_id}"))),
        };

        let result = store
            .query(collection_id, filters, page)
            .map_err(|_| HubError::NotFound(format!("collection {collection_id}")))?;
        drop(store);

        let level = self.disclosure_level(&org, &collection.owner_org);
        let mut ctx = AnonymizationContext::new();
        let mut objects = Vec::with_capacity(result.objects.len());
        for stored in &result.objects {
            match self.disclose(&stored.object, level, &mut ctx) {
                Ok(object) => objects.push(object),
                Err(message) => {
                    warn!(
                        object_id = %stored.object.id,
                        %message,
                        "excluding object whose anonymization failed"
                    );
                }
            }
        }

        self.audit.record(AuditEntry::new(
            AuditOperation::ObjectsServed {
                collection_id: collection_id.to_string(),
                result_count: objects.len(),
                anonymized: level != AnonymizationLevel::None,
            },
            Some(&org),
        ));
        Ok(Envelope {
            objects,
            more: result.more,
            next: result.next_offset,
        })
    }

    /// Single-object fetch. Missing objects and denied access both surface
    /// as not-found so existence of denied data is never confirmed.
    pub async fn get_object(
        &self,
        collection_id: &str,
        object_id: &str,
        requester: &str,
    ) -> Result<StixObject, HubError> {
        let org = self.require_org(requester)?;
        let store = self.store.read().await;
        let collection = match store.collection(collection_id) {
            Some(collection) if collection.readable_by(&org) => collection.clone(),
            _ => return Err(HubError::NotFound(format!("collection {collection_id}"))),
        };
        let stored = store
            .get(collection_id, object_id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(format!("object {object_id}")))?;
        drop(store);

        let level = self.disclosure_level(&org, &collection.owner_org);
        let mut ctx = AnonymizationContext::new();
        let object = self
            .disclose(&stored.object, level, &mut ctx)
            .map_err(|_| HubError::NotFound(format!("object {object_id}")))?;

        self.audit.record(AuditEntry::new(
            AuditOperation::ObjectServed {
                collection_id: collection_id.to_string(),
                object_id: object_id.to_string(),
                anonymized: level != AnonymizationLevel::None,
            },
            Some(&org),
        ));
        Ok(object)
    }

    /// Lightweight per-object manifest with the same filter and pagination
    /// semantics as the object listing.
    pub async fn get_manifest(
        &self,
        collection_id: &str,
        requester: &str,
        filters: &QueryFilters,
        page: &Page,
    ) -> Result<Manifest, HubError> {
        let org = self.require_org(requester)?;
        let store = self.store.read().await;
        match store.collection(collection_id) {
            Some(collection) if collection.readable_by(&org) => {}
            _ => return Err(HubError::NotFound(format!("collection {collection_id}"))),
        }
        let result = store
            .query(collection_id, filters, page)
            .map_err(|_| HubError::NotFound(format!("collection {collection_id}")))?;
        drop(store);

        let entries: Vec<ManifestEntry> =
            result.objects.iter().map(ManifestEntry::from_stored).collect();
        self.audit.record(AuditEntry::new(
            AuditOperation::ManifestServed {
                collection_id: collection_id.to_string(),
                result_count: entries.len(),
            },
            Some(&org),
        ));
        Ok(Manifest {
            objects: entries,
            more: result.more,
            next: result.next_offset,
        })
    }

    /// Partial-success ingestion: each inbound value runs the version
    /// pipeline and validation independently; failures are reported, never
    /// propagated.
    pub async fn add_objects(
        &self,
        collection_id: &str,
        requester: &str,
        values: &[Value],
    ) -> Result<IngestReport, HubError> {
        let org = self.require_org(requester)?;
        {
            let store = self.store.read().await;
            let collection = store
                .collection(collection_id)
                .ok_or_else(|| HubError::NotFound(format!("collection {collection_id}")))?;
            if !collection.writable_by(&org) {
                self.audit.record(AuditEntry::new(
                    AuditOperation::AccessDenied {
                        collection_id: collection_id.to_string(),
                        reason: "write capability required".to_string(),
                    },
                    Some(&org),
                ));
                return Err(HubError::AccessDenied(format!(
                    "{org} may not write to collection {collection_id}"
                )));
            }
        }

        let mut success_count = 0;
        let mut failures = Vec::new();
        for value in values {
            match ingest::normalize(value) {
                Ok(objects) => {
                    // Upserts serialize per object id under the write lock.
                    let mut store = self.store.write().await;
                    for object in objects {
                        match store.upsert(collection_id, object) {
                            Ok(_) => success_count += 1,
                            Err(e) => failures.push(IngestFailure {
                                object: ingest::describe(value),
                                message: e.to_string(),
                            }),
                        }
                    }
                }
                Err(message) => failures.push(IngestFailure {
                    object: ingest::describe(value),
                    message,
                }),
            }
        }

        let report = IngestReport {
            success_count,
            failures,
            pending_count: 0,
        };
        debug!(
            collection_id,
            success = report.success_count,
            failed = report.failures.len(),
            "ingestion finished"
        );
        self.audit.record(AuditEntry::new(
            AuditOperation::ObjectsAdded {
                collection_id: collection_id.to_string(),
                success_count: report.success_count,
                failure_count: report.failures.len(),
            },
            Some(&org),
        ));
        Ok(report)
    }

    /// The anonymization level the owner's trust in the requester implies.
    /// No effective relationship means maximal anonymization.
    fn disclosure_level(&self, requester: &str, owner: &str) -> AnonymizationLevel {
        if requester == owner {
            return AnonymizationLevel::None;
        }
        self.trust
            .resolve_trust(requester, owner)
            .map(|resolved| resolved.relationship.anonymization)
            .unwrap_or(AnonymizationLevel::Full)
    }

    fn disclose(
        &self,
        object: &StixObject,
        level: AnonymizationLevel,
        ctx: &mut AnonymizationContext,
    ) -> Result<StixObject, String> {
        if level == AnonymizationLevel::None {
            return Ok(object.clone());
        }
        self.anonymizer
            .anonymize_object(object, level, &AnonymizeOptions::default(), ctx)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karasu_store::{InMemoryDirectory, MemoryAuditSink, NullAuditSink, Organization};
    use karasu_trust::CreateOptions;
    use serde_json::json;

    fn service_with(audit: Arc<dyn AuditSink>) -> CollectionService {
        let directory = InMemoryDirectory::new();
        directory.register(Organization::new("org-a", "Alpha CERT"));
        directory.register(Organization::new("org-b", "Beta SOC"));
        CollectionService::new(
            Arc::new(RwLock::new(ObjectStore::new())),
            Arc::new(TrustPolicyEngine::new()),
            Arc::new(AnonymizationEngine::new()),
            Arc::new(directory),
            audit,
        )
    }

    fn service() -> CollectionService {
        service_with(Arc::new(NullAuditSink))
    }

    async fn seeded_collection(service: &CollectionService, count: usize) -> String {
        let collection = Collection::new("indicators", "shared indicators", "org-a");
        let id = collection.id.clone();
        service.create_collection(collection).await.unwrap();
        let mut store = service.store.write().await;
        for i in 0..count {
            let object = StixObject::new("indicator")
                .with_field("pattern", json!(format!("[ipv4-addr:value = '203.0.113.{i}']")))
                .with_field("pattern_type", json!("stix"))
                .with_field("valid_from", json!("2024-05-01T00:00:00Z"))
                .with_field("description", json!(format!("c2 host 203.0.113.{i}")));
            store.upsert(&id, object).unwrap();
        }
        id
    }

    #[tokio::test]
    async fn listing_is_scoped_to_readable_collections() {
        let service = service();
        let id = seeded_collection(&service, 1).await;
        let shared = Collection::new("open", "", "org-b").with_reader("org-a");
        service.create_collection(shared).await.unwrap();

        let for_a = service.list_collections("org-a").await.unwrap();
        assert_eq!(for_a.len(), 2);
        let for_b = service.list_collections("org-b").await.unwrap();
        assert_eq!(for_b.len(), 1);
        assert_ne!(for_b[0].id, id);
    }

    #[tokio::test]
    async fn unknown_requester_is_denied() {
        let service = service();
        assert!(matches!(
            service.list_collections("org-z").await,
            Err(HubError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn owner_reads_unanonymized() {
        let service = service();
        let id = seeded_collection(&service, 1).await;
        let envelope = service
            .get_collection_objects(&id, "org-a", &QueryFilters::default(), &Page::default())
            .await
            .unwrap();
        assert_eq!(envelope.objects.len(), 1);
        let description = envelope.objects[0].field("description").unwrap();
        assert!(description.as_str().unwrap().contains("203.0.113.0"));
    }

    #[tokio::test]
    async fn unreadable_collection_is_not_found() {
        let service = service();
        let id = seeded_collection(&service, 1).await;
        assert!(matches!(
            service
                .get_collection_objects(&id, "org-b", &QueryFilters::default(), &Page::default())
                .await,
            Err(HubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn untrusted_reader_gets_maximal_anonymization() {
        let service = service();
        // Explicit read grant, but no trust relationship at all.
        let collection = Collection::new("indicators", "", "org-a").with_reader("org-b");
        let id = collection.id.clone();
        service.create_collection(collection).await.unwrap();
        {
            let mut store = service.store.write().await;
            for i in 0..3 {
                let object = StixObject::new("indicator")
                    .with_field("pattern", json!(format!("[ipv4-addr:value = '203.0.113.{i}']")))
                    .with_field("pattern_type", json!("stix"))
                    .with_field("valid_from", json!("2024-05-01T00:00:00Z"))
                    .with_field("description", json!(format!("c2 host 203.0.113.{i}")));
                store.upsert(&id, object).unwrap();
            }
        }

        let envelope = service
            .get_collection_objects(&id, "org-b", &QueryFilters::default(), &Page::default())
            .await
            .unwrap();
        assert!(envelope.objects.len() <= 3);
        for object in &envelope.objects {
            // Full level strips descriptions and rewrites pattern literals.
            assert!(object.field("description").is_none());
            let pattern = object.field("pattern").unwrap().as_str().unwrap();
            assert!(!pattern.contains("203.0.113."), "leaked literal: {pattern}");
        }
    }

    #[tokio::test]
    async fn trusted_reader_gets_level_from_relationship() {
        let service = service();
        let collection = Collection::new("indicators", "", "org-a").with_reader("org-b");
        let id = collection.id.clone();
        service.create_collection(collection).await.unwrap();
        {
            let mut store = service.store.write().await;
            let object = StixObject::new("ipv4-addr").with_field("value", json!("198.51.100.7"));
            store.upsert(&id, object).unwrap();
        }
        // standard trust maps to Low anonymization: octet masking.
        let rel = service
            .trust
            .create_relationship("org-b", "org-a", "standard", "org-b", CreateOptions::default())
            .unwrap();
        service.trust.approve(rel.id, "org-a", "alice").unwrap();
        service.trust.approve(rel.id, "org-b", "bob").unwrap();

        let envelope = service
            .get_collection_objects(&id, "org-b", &QueryFilters::default(), &Page::default())
            .await
            .unwrap();
        assert_eq!(
            envelope.objects[0].field("value"),
            Some(&json!("198.51.100.x"))
        );
    }

    #[tokio::test]
    async fn pagination_carries_more_and_next() {
        let service = service();
        let id = seeded_collection(&service, 5).await;
        let first = service
            .get_collection_objects(&id, "org-a", &QueryFilters::default(), &Page { limit: 2, offset: 0 })
            .await
            .unwrap();
        assert_eq!(first.objects.len(), 2);
        assert!(first.more);
        assert_eq!(first.next, Some(2));

        let last = service
            .get_collection_objects(&id, "org-a", &QueryFilters::default(), &Page { limit: 2, offset: 4 })
            .await
            .unwrap();
        assert_eq!(last.objects.len(), 1);
        assert!(!last.more);
        assert_eq!(last.next, None);
    }

    #[tokio::test]
    async fn missing_and_denied_objects_are_both_not_found() {
        let service = service();
        let id = seeded_collection(&service, 1).await;
        assert!(matches!(
            service.get_object(&id, "indicator--nope", "org-a").await,
            Err(HubError::NotFound(_))
        ));
        let envelope = service
            .get_collection_objects(&id, "org-a", &QueryFilters::default(), &Page::default())
            .await
            .unwrap();
        let object_id = envelope.objects[0].id.clone();
        assert!(matches!(
            service.get_object(&id, &object_id, "org-b").await,
            Err(HubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn manifest_is_never_anonymized() {
        let service = service();
        let collection = Collection::new("indicators", "", "org-a").with_reader("org-b");
        let id = collection.id.clone();
        service.create_collection(collection).await.unwrap();
        let object_id = {
            let mut store = service.store.write().await;
            let object = StixObject::new("malware")
                .with_field("name", json!("wiper"))
                .with_field("is_family", json!(false));
            let object_id = object.id.clone();
            store.upsert(&id, object).unwrap();
            object_id
        };

        let manifest = service
            .get_manifest(&id, "org-b", &QueryFilters::default(), &Page::default())
            .await
            .unwrap();
        assert_eq!(manifest.objects.len(), 1);
        assert_eq!(manifest.objects[0].id, object_id);
        assert_eq!(manifest.objects[0].media_type, STIX_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn ingestion_reports_partial_success() {
        let service = service();
        let id = seeded_collection(&service, 0).await;
        let values = vec![
            json!({
                "type": "indicator",
                "id": "indicator--6ba7b810-9dad-11d1-80b4-00c04fd430c8",
                "spec_version": "2.1",
                "pattern": "[ipv4-addr:value = '203.0.113.5']",
                "pattern_type": "stix",
                "valid_from": "2024-05-01T00:00:00Z"
            }),
            json!({
                "type": "indicator",
                "id": "indicator--6ba7b810-9dad-11d1-80b4-00c04fd430c9",
                "spec_version": "2.1"
            }),
        ];
        let report = service.add_objects(&id, "org-a", &values).await.unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.pending_count, 0);
        assert!(report.is_partial());
        assert_eq!(
            report.failures[0].object,
            "indicator--6ba7b810-9dad-11d1-80b4-00c04fd430c9"
        );
    }

    #[tokio::test]
    async fn ingestion_requires_write_capability() {
        let service = service();
        let collection = Collection::new("indicators", "", "org-a").with_reader("org-b");
        let id = collection.id.clone();
        service.create_collection(collection).await.unwrap();
        assert!(matches!(
            service.add_objects(&id, "org-b", &[json!({})]).await,
            Err(HubError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn served_operations_reach_the_audit_sink() {
        let audit = Arc::new(MemoryAuditSink::new());
        let service = service_with(audit.clone());
        let id = seeded_collection(&service, 1).await;
        service
            .get_collection_objects(&id, "org-a", &QueryFilters::default(), &Page::default())
            .await
            .unwrap();
        service
            .get_manifest(&id, "org-a", &QueryFilters::default(), &Page::default())
            .await
            .unwrap();

        let entries = audit.entries();
        assert!(entries.iter().any(|e| matches!(e.operation, AuditOperation::ObjectsServed { .. })));
        assert!(entries.iter().any(|e| matches!(e.operation, AuditOperation::ManifestServed { .. })));
    }
}
