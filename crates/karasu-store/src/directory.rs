//! Organization identity lookup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

impl Organization {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Identity lookup seam. Resolution failure means the requester is unknown,
/// not that the lookup errored.
pub trait OrganizationDirectory: Send + Sync {
    fn resolve(&self, org_id: &str) -> Option<Organization>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    orgs: Mutex<HashMap<String, Organization>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, org: Organization) {
        self.orgs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(org.id.clone(), org);
    }
}

impl OrganizationDirectory for InMemoryDirectory {
    fn resolve(&self, org_id: &str) -> Option<Organization> {
        self.orgs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(org_id)
            .cloned()
    }
}
