//! In-memory object store with collection scoping and a date-added index

use crate::collection::Collection;
use chrono::{DateTime, Utc};
use karasu_core::StixObject;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Default page size when the caller does not pass a limit.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection already exists: {0}")]
    DuplicateCollection(String),
}

/// A canonical object plus its storage bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub object: StixObject,
    pub date_added: DateTime<Utc>,
    /// Object version timestamp: `modified`, falling back to `created`,
    /// falling back to `date_added`.
    pub version: DateTime<Utc>,
}

/// Conjunction of the supported query filters.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub object_type: Option<String>,
    pub id: Option<String>,
    pub spec_version: Option<String>,
    /// Strictly-greater filter on `date_added`.
    pub added_after: Option<DateTime<Utc>>,
}

impl QueryFilters {
    pub fn matches(&self, stored: &StoredObject) -> bool {
        if let Some(object_type) = &self.object_type {
            if &stored.object.object_type != object_type {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if &stored.object.id != id {
                return false;
            }
        }
        if let Some(spec_version) = &self.spec_version {
            if stored.object.spec_version.as_deref() != Some(spec_version.as_str()) {
                return false;
            }
        }
        if let Some(added_after) = self.added_after {
            if stored.date_added <= added_after {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub objects: Vec<StoredObject>,
    pub more: bool,
    /// Offset of the next page when `more` is true.
    pub next_offset: Option<usize>,
}

/// Store statistics, mainly for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub collection_count: usize,
    pub object_count: usize,
}

/// In-memory object store. Single-writer semantics; concurrent callers wrap
/// it in a lock and serialize upserts per object id behind it.
#[derive(Debug, Default)]
pub struct ObjectStore {
    collections: HashMap<String, Collection>,
    objects: HashMap<String, Vec<StoredObject>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_collection(&mut self, collection: Collection) -> Result<(), StoreError> {
        if self.collections.contains_key(&collection.id) {
            return Err(StoreError::DuplicateCollection(collection.id));
        }
        self.objects.insert(collection.id.clone(), Vec::new());
        self.collections.insert(collection.id.clone(), collection);
        Ok(())
    }

    pub fn collection(&self, collection_id: &str) -> Option<&Collection> {
        self.collections.get(collection_id)
    }

    /// Collections the organization owns or may read.
    pub fn collections_for(&self, org: &str) -> Vec<Collection> {
        let mut accessible: Vec<Collection> = self
            .collections
            .values()
            .filter(|c| c.readable_by(org))
            .cloned()
            .collect();
        accessible.sort_by(|a, b| a.id.cmp(&b.id));
        accessible
    }

    /// Insert or replace by object id. Replacement keeps the original
    /// `date_added` and refreshes the version timestamp.
    pub fn upsert(
        &mut self,
        collection_id: &str,
        object: StixObject,
    ) -> Result<DateTime<Utc>, StoreError> {
        let entries = self
            .objects
            .get_mut(collection_id)
            .ok_or_else(|| StoreError::CollectionNotFound(collection_id.to_string()))?;

        let now = Utc::now();
        let version = object.modified.or(object.created).unwrap_or(now);
        match entries.iter_mut().find(|e| e.object.id == object.id) {
            Some(existing) => {
                existing.object = object;
                existing.version = version;
                Ok(existing.date_added)
            }
            None => {
                entries.push(StoredObject {
                    object,
                    date_added: now,
                    version,
                });
                Ok(now)
            }
        }
    }

    pub fn get(&self, collection_id: &str, object_id: &str) -> Option<&StoredObject> {
        self.objects
            .get(collection_id)?
            .iter()
            .find(|e| e.object.id == object_id)
    }

    /// Filter conjunction, then stable (date_added, id) ordering, then
    /// pagination.
    pub fn query(
        &self,
        collection_id: &str,
        filters: &QueryFilters,
        page: &Page,
    ) -> Result<PageResult, StoreError> {
        let entries = self
            .objects
            .get(collection_id)
            .ok_or_else(|| StoreError::CollectionNotFound(collection_id.to_string()))?;

        let mut matched: Vec<&StoredObject> =
            entries.iter().filter(|e| filters.matches(e)).collect();
        matched.sort_by(|a, b| {
            a.date_added
                .cmp(&b.date_added)
                .then_with(|| a.object.id.cmp(&b.object.id))
        });

        let total = matched.len();
        let objects: Vec<StoredObject> = matched
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();
        let more = page.offset + page.limit < total;
        Ok(PageResult {
            objects,
            more,
            next_offset: more.then_some(page.offset + page.limit),
        })
    }

    pub fn statistics(&self) -> StoreStatistics {
        StoreStatistics {
            collection_count: self.collections.len(),
            object_count: self.objects.values().map(Vec::len).sum(),
        }
    }
}
