//! Collection metadata and access capabilities

use karasu_core::STIX_MEDIA_TYPE;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named collection of canonical objects owned by one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: String,
    pub description: String,
    pub owner_org: String,
    /// Organizations with explicit read capability, owner excluded.
    pub can_read: Vec<String>,
    /// Organizations with explicit write capability, owner excluded.
    pub can_write: Vec<String>,
    pub media_types: Vec<String>,
}

impl Collection {
    pub fn new(title: &str, description: &str, owner_org: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            owner_org: owner_org.to_string(),
            can_read: Vec::new(),
            can_write: Vec::new(),
            media_types: vec![STIX_MEDIA_TYPE.to_string()],
        }
    }

    pub fn with_reader(mut self, org: &str) -> Self {
        self.can_read.push(org.to_string());
        self
    }

    pub fn with_writer(mut self, org: &str) -> Self {
        self.can_write.push(org.to_string());
        self
    }

    /// Owner bypass always applies.
    pub fn readable_by(&self, org: &str) -> bool {
        self.owner_org == org || self.can_read.iter().any(|o| o == org)
    }

    pub fn writable_by(&self, org: &str) -> bool {
        self.owner_org == org || self.can_write.iter().any(|o| o == org)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_reads_and_writes_without_explicit_grants() {
        let collection = Collection::new("indicators", "", "org-a");
        assert!(collection.readable_by("org-a"));
        assert!(collection.writable_by("org-a"));
        assert!(!collection.readable_by("org-b"));
        assert!(!collection.writable_by("org-b"));
    }

    #[test]
    fn explicit_grants_are_separate_capabilities() {
        let collection = Collection::new("indicators", "", "org-a").with_reader("org-b");
        assert!(collection.readable_by("org-b"));
        assert!(!collection.writable_by("org-b"));
    }
}
