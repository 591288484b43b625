//! Trust policy engine
//!
//! All mutating operations serialize on one write lock, so concurrent
//! approvals or a concurrent approve/revoke on the same relationship are
//! mutually exclusive and the pending-to-active transition fires exactly
//! once. Expiry is computed lazily during resolution, never by a timer.

use crate::model::{
    is_valid_org_id, AccessLevel, NullEventSink, RelationshipKind, RelationshipStatus, TrustError,
    TrustEvent, TrustEventSink, TrustGroup, TrustLevel, TrustRelationship,
};
use chrono::{DateTime, Utc};
use karasu_anonymize::AnonymizationLevel;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// The outcome of a trust resolution for an ordered org pair.
#[derive(Debug, Clone)]
pub struct ResolvedTrust {
    pub level: TrustLevel,
    pub relationship: TrustRelationship,
}

/// The outcome of an access check. Insufficient access is a decision, not
/// an error.
#[derive(Debug, Clone)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
    pub relationship: Option<TrustRelationship>,
}

/// Optional knobs for relationship creation.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub kind: RelationshipKind,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub anonymization: Option<AnonymizationLevel>,
    pub access: Option<AccessLevel>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            kind: RelationshipKind::Bilateral,
            valid_from: None,
            valid_until: None,
            anonymization: None,
            access: None,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    levels: HashMap<String, TrustLevel>,
    relationships: HashMap<Uuid, TrustRelationship>,
    groups: HashMap<String, TrustGroup>,
}

pub struct TrustPolicyEngine {
    state: RwLock<EngineState>,
    events: Arc<dyn TrustEventSink>,
}

impl TrustPolicyEngine {
    pub fn new() -> Self {
        Self::with_event_sink(Arc::new(NullEventSink))
    }

    pub fn with_event_sink(events: Arc<dyn TrustEventSink>) -> Self {
        let mut levels = HashMap::new();
        for level in [
            TrustLevel::new("none", 0, AnonymizationLevel::Full, AccessLevel::None),
            TrustLevel::new("minimal", 25, AnonymizationLevel::High, AccessLevel::Read),
            TrustLevel::new("moderate", 50, AnonymizationLevel::Medium, AccessLevel::Subscribe),
            TrustLevel::new("standard", 75, AnonymizationLevel::Low, AccessLevel::Contribute),
            TrustLevel::new("full", 100, AnonymizationLevel::None, AccessLevel::Full),
        ] {
            levels.insert(level.name.clone(), level);
        }
        Self {
            state: RwLock::new(EngineState {
                levels,
                relationships: HashMap::new(),
                groups: HashMap::new(),
            }),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register or supersede a trust level. Ranks stay unique.
    pub fn define_level(&self, level: TrustLevel) -> Result<(), TrustError> {
        let mut state = self.write();
        let clash = state
            .levels
            .values()
            .any(|existing| existing.rank == level.rank && existing.name != level.name);
        if clash {
            return Err(TrustError::Validation(vec![format!(
                "rank {} is already taken by another level",
                level.rank
            )]));
        }
        state.levels.insert(level.name.clone(), level);
        Ok(())
    }

    pub fn level(&self, name: &str) -> Option<TrustLevel> {
        self.read().levels.get(name).cloned()
    }

    pub fn relationship(&self, id: Uuid) -> Option<TrustRelationship> {
        self.read().relationships.get(&id).cloned()
    }

    pub fn group(&self, name: &str) -> Option<TrustGroup> {
        self.read().groups.get(name).cloned()
    }

    /// Create a pending relationship. Neither side is approved yet.
    pub fn create_relationship(
        &self,
        source_org: &str,
        target_org: &str,
        trust_level: &str,
        created_by: &str,
        opts: CreateOptions,
    ) -> Result<TrustRelationship, TrustError> {
        let mut state = self.write();
        let mut errors = Vec::new();

        if source_org == target_org {
            errors.push("source and target organization must differ".to_string());
        }
        if !is_valid_org_id(source_org) {
            errors.push(format!("malformed source organization id: {source_org:?}"));
        }
        if !is_valid_org_id(target_org) {
            errors.push(format!("malformed target organization id: {target_org:?}"));
        }
        let level = match state.levels.get(trust_level) {
            Some(level) if level.active => Some(level.clone()),
            Some(_) => {
                errors.push(format!("trust level '{trust_level}' is inactive"));
                None
            }
            None => {
                errors.push(format!("unknown trust level '{trust_level}'"));
                None
            }
        };
        let duplicate = state.relationships.values().any(|rel| {
            rel.group.is_none()
                && rel.source_org == source_org
                && rel.target_org == target_org
                && matches!(rel.status, RelationshipStatus::Pending | RelationshipStatus::Active)
        });
        if duplicate {
            errors.push(format!(
                "an open relationship {source_org} -> {target_org} already exists"
            ));
        }
        if !errors.is_empty() {
            return Err(TrustError::Validation(errors));
        }
        // Checked above when errors is empty.
        let level = match level {
            Some(level) => level,
            None => return Err(TrustError::Validation(vec!["unknown trust level".to_string()])),
        };

        let now = Utc::now();
        let relationship = TrustRelationship {
            id: Uuid::new_v4(),
            source_org: source_org.to_string(),
            target_org: target_org.to_string(),
            trust_level: level.name.clone(),
            kind: opts.kind,
            approved_by_source: false,
            approved_by_target: false,
            source_approver: None,
            target_approver: None,
            status: RelationshipStatus::Pending,
            valid_from: opts.valid_from.unwrap_or(now),
            valid_until: opts.valid_until,
            anonymization: opts.anonymization.unwrap_or(level.anonymization),
            access: opts.access.unwrap_or(level.access),
            group: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            revoking_org: None,
            revoked_by: None,
            revoked_at: None,
            revocation_reason: None,
        };
        state.relationships.insert(relationship.id, relationship.clone());
        self.events.dispatch(&TrustEvent::RelationshipCreated {
            id: relationship.id,
            source_org: relationship.source_org.clone(),
            target_org: relationship.target_org.clone(),
        });
        Ok(relationship)
    }

    /// Record one side's approval, with the acting user handle kept for
    /// bookkeeping. Returns true only on the call where the second approval
    /// lands and the relationship activates; an approval that was already
    /// recorded is a no-op returning false.
    pub fn approve(
        &self,
        id: Uuid,
        approving_org: &str,
        approved_by: &str,
    ) -> Result<bool, TrustError> {
        let mut state = self.write();
        let relationship = state
            .relationships
            .get_mut(&id)
            .ok_or_else(|| TrustError::NotFound(format!("relationship {id}")))?;

        if !relationship.involves(approving_org) {
            return Err(TrustError::Validation(vec![format!(
                "{approving_org} is not an endpoint of relationship {id}"
            )]));
        }
        let now = Utc::now();
        // An elapsed validity window expires the edge here, so a late
        // approval can never flip an already-dead relationship to active.
        if !relationship.status.is_terminal()
            && relationship.valid_until.map_or(false, |until| until <= now)
        {
            relationship.status = RelationshipStatus::Expired;
            relationship.updated_at = now;
            self.events.dispatch(&TrustEvent::Expired { id });
        }
        if relationship.status.is_terminal()
            || relationship.status == RelationshipStatus::Suspended
        {
            return Err(TrustError::Validation(vec![format!(
                "relationship {id} cannot be approved in status {:?}",
                relationship.status
            )]));
        }

        let (flag, approver) = if relationship.source_org == approving_org {
            (&mut relationship.approved_by_source, &mut relationship.source_approver)
        } else {
            (&mut relationship.approved_by_target, &mut relationship.target_approver)
        };
        if *flag {
            return Ok(false);
        }
        *flag = true;
        *approver = Some(approved_by.to_string());
        relationship.updated_at = now;
        self.events.dispatch(&TrustEvent::Approved {
            id,
            org: approving_org.to_string(),
        });

        let activated = relationship.approved_by_source
            && relationship.approved_by_target
            && relationship.status == RelationshipStatus::Pending;
        if activated {
            relationship.status = RelationshipStatus::Active;
            self.events.dispatch(&TrustEvent::Activated { id });
        }
        Ok(activated)
    }

    /// Revoke from any non-terminal status, recording the acting user handle
    /// alongside the revoking org. Already revoked/expired is an idempotent
    /// false, not an error.
    pub fn revoke(
        &self,
        id: Uuid,
        revoking_org: &str,
        revoked_by: &str,
        reason: &str,
    ) -> Result<bool, TrustError> {
        let mut state = self.write();
        let relationship = state
            .relationships
            .get_mut(&id)
            .ok_or_else(|| TrustError::NotFound(format!("relationship {id}")))?;

        if !relationship.involves(revoking_org) {
            return Err(TrustError::Validation(vec![format!(
                "{revoking_org} is not an endpoint of relationship {id}"
            )]));
        }
        if relationship.status.is_terminal() {
            return Ok(false);
        }

        relationship.status = RelationshipStatus::Revoked;
        relationship.revoking_org = Some(revoking_org.to_string());
        relationship.revoked_by = Some(revoked_by.to_string());
        relationship.revoked_at = Some(Utc::now());
        relationship.revocation_reason = Some(reason.to_string());
        relationship.updated_at = Utc::now();
        self.events.dispatch(&TrustEvent::Revoked {
            id,
            org: revoking_org.to_string(),
            reason: reason.to_string(),
        });
        Ok(true)
    }

    /// Pause an active relationship. Suspended edges stop being effective
    /// but can be reinstated.
    pub fn suspend(&self, id: Uuid, org: &str) -> Result<bool, TrustError> {
        let mut state = self.write();
        let relationship = state
            .relationships
            .get_mut(&id)
            .ok_or_else(|| TrustError::NotFound(format!("relationship {id}")))?;
        if !relationship.involves(org) {
            return Err(TrustError::Validation(vec![format!(
                "{org} is not an endpoint of relationship {id}"
            )]));
        }
        match relationship.status {
            RelationshipStatus::Active => {
                relationship.status = RelationshipStatus::Suspended;
                relationship.updated_at = Utc::now();
                self.events.dispatch(&TrustEvent::Suspended { id, org: org.to_string() });
                Ok(true)
            }
            RelationshipStatus::Suspended => Ok(false),
            other => Err(TrustError::Validation(vec![format!(
                "relationship {id} cannot be suspended in status {other:?}"
            )])),
        }
    }

    pub fn reinstate(&self, id: Uuid, org: &str) -> Result<bool, TrustError> {
        let mut state = self.write();
        let relationship = state
            .relationships
            .get_mut(&id)
            .ok_or_else(|| TrustError::NotFound(format!("relationship {id}")))?;
        if !relationship.involves(org) {
            return Err(TrustError::Validation(vec![format!(
                "{org} is not an endpoint of relationship {id}"
            )]));
        }
        match relationship.status {
            RelationshipStatus::Suspended => {
                relationship.status = RelationshipStatus::Active;
                relationship.updated_at = Utc::now();
                self.events.dispatch(&TrustEvent::Reinstated { id, org: org.to_string() });
                Ok(true)
            }
            RelationshipStatus::Active => Ok(false),
            other => Err(TrustError::Validation(vec![format!(
                "relationship {id} cannot be reinstated in status {other:?}"
            )])),
        }
    }

    /// Resolve the effective trust for the ordered pair. Same-org pairs get
    /// a synthetic full-trust result without a lookup; otherwise a direct
    /// edge wins over a group-derived community edge. Due relationships are
    /// expired here, lazily.
    pub fn resolve_trust(&self, source_org: &str, target_org: &str) -> Option<ResolvedTrust> {
        self.resolve_trust_at(source_org, target_org, Utc::now())
    }

    pub fn resolve_trust_at(
        &self,
        source_org: &str,
        target_org: &str,
        now: DateTime<Utc>,
    ) -> Option<ResolvedTrust> {
        if source_org == target_org {
            return Some(self.synthetic_self_trust(source_org, now));
        }

        let mut state = self.write();

        // Lazy expiry pass over edges for this pair.
        let mut expired = Vec::new();
        for relationship in state.relationships.values_mut() {
            if relationship.source_org == source_org
                && relationship.target_org == target_org
                && relationship.status == RelationshipStatus::Active
                && relationship.valid_until.map_or(false, |until| until <= now)
            {
                relationship.status = RelationshipStatus::Expired;
                relationship.updated_at = now;
                expired.push(relationship.id);
            }
        }
        for id in expired {
            self.events.dispatch(&TrustEvent::Expired { id });
        }

        let best = state
            .relationships
            .values()
            .filter(|rel| {
                rel.source_org == source_org
                    && rel.target_org == target_org
                    && rel.is_effective(now)
            })
            // Direct edges outrank group-derived ones; among the latter the
            // highest-ranked trust level wins, independent of map order.
            .max_by_key(|rel| {
                let rank = state.levels.get(&rel.trust_level).map_or(0, |level| level.rank);
                (rel.group.is_none(), rank)
            })
            .cloned()?;
        let level = state.levels.get(&best.trust_level).cloned()?;
        Some(ResolvedTrust {
            level,
            relationship: best,
        })
    }

    fn synthetic_self_trust(&self, org: &str, now: DateTime<Utc>) -> ResolvedTrust {
        let level = self
            .read()
            .levels
            .get("full")
            .cloned()
            .unwrap_or_else(|| {
                TrustLevel::new("full", 100, AnonymizationLevel::None, AccessLevel::Full)
            });
        ResolvedTrust {
            relationship: TrustRelationship {
                id: Uuid::new_v4(),
                source_org: org.to_string(),
                target_org: org.to_string(),
                trust_level: level.name.clone(),
                kind: RelationshipKind::Bilateral,
                approved_by_source: true,
                approved_by_target: true,
                source_approver: None,
                target_approver: None,
                status: RelationshipStatus::Active,
                valid_from: now,
                valid_until: None,
                anonymization: AnonymizationLevel::None,
                access: AccessLevel::Full,
                group: None,
                created_by: org.to_string(),
                created_at: now,
                updated_at: now,
                revoking_org: None,
                revoked_by: None,
                revoked_at: None,
                revocation_reason: None,
            },
            level,
        }
    }

    /// Compare the resolved access level against `required` on the fixed
    /// none < read < subscribe < contribute < full scale.
    pub fn can_access(
        &self,
        requesting_org: &str,
        owner_org: &str,
        required: AccessLevel,
    ) -> AccessDecision {
        match self.resolve_trust(requesting_org, owner_org) {
            None => AccessDecision {
                allowed: false,
                reason: format!(
                    "no effective trust relationship from {requesting_org} to {owner_org}"
                ),
                relationship: None,
            },
            Some(resolved) => {
                let granted = resolved.relationship.access;
                if granted >= required {
                    AccessDecision {
                        allowed: true,
                        reason: format!("granted by trust level '{}'", resolved.level.name),
                        relationship: Some(resolved.relationship),
                    }
                } else {
                    AccessDecision {
                        allowed: false,
                        reason: format!(
                            "access level '{}' is below required '{}'",
                            granted.as_str(),
                            required.as_str()
                        ),
                        relationship: Some(resolved.relationship),
                    }
                }
            }
        }
    }

    pub fn create_group(
        &self,
        name: &str,
        description: &str,
        default_trust_level: &str,
        created_by: &str,
    ) -> Result<TrustGroup, TrustError> {
        let mut state = self.write();
        let mut errors = Vec::new();
        if state.groups.contains_key(name) {
            errors.push(format!("group '{name}' already exists"));
        }
        if !state.levels.contains_key(default_trust_level) {
            errors.push(format!("unknown trust level '{default_trust_level}'"));
        }
        if !is_valid_org_id(created_by) {
            errors.push(format!("malformed organization id: {created_by:?}"));
        }
        if !errors.is_empty() {
            return Err(TrustError::Validation(errors));
        }

        let group = TrustGroup {
            name: name.to_string(),
            description: description.to_string(),
            default_trust_level: default_trust_level.to_string(),
            members: vec![created_by.to_string()],
            admins: vec![created_by.to_string()],
            created_at: Utc::now(),
        };
        state.groups.insert(name.to_string(), group.clone());
        Ok(group)
    }

    /// Join a group: activates an implicit community edge to and from every
    /// existing member at the group's default level.
    pub fn join_group(&self, group_name: &str, org: &str) -> Result<(), TrustError> {
        let mut state = self.write();
        if !is_valid_org_id(org) {
            return Err(TrustError::Validation(vec![format!(
                "malformed organization id: {org:?}"
            )]));
        }
        let group = state
            .groups
            .get(group_name)
            .ok_or_else(|| TrustError::NotFound(format!("group {group_name}")))?;
        if group.is_member(org) {
            return Ok(());
        }
        let peers = group.members.clone();
        let level = state
            .levels
            .get(&group.default_trust_level)
            .cloned()
            .ok_or_else(|| {
                TrustError::NotFound(format!("trust level {}", group.default_trust_level))
            })?;

        for peer in &peers {
            Self::activate_group_edge(&mut state, group_name, org, peer, &level);
            Self::activate_group_edge(&mut state, group_name, peer, org, &level);
        }
        if let Some(group) = state.groups.get_mut(group_name) {
            group.members.push(org.to_string());
        }
        self.events.dispatch(&TrustEvent::GroupJoined {
            group: group_name.to_string(),
            org: org.to_string(),
        });
        Ok(())
    }

    /// Leave a group: deactivates only the edges this group derived.
    pub fn leave_group(&self, group_name: &str, org: &str) -> Result<(), TrustError> {
        let mut state = self.write();
        let group = state
            .groups
            .get_mut(group_name)
            .ok_or_else(|| TrustError::NotFound(format!("group {group_name}")))?;
        if !group.is_member(org) {
            return Err(TrustError::Validation(vec![format!(
                "{org} is not a member of group {group_name}"
            )]));
        }
        group.members.retain(|m| m != org);
        group.admins.retain(|a| a != org);

        let now = Utc::now();
        for relationship in state.relationships.values_mut() {
            if relationship.group.as_deref() == Some(group_name)
                && relationship.involves(org)
                && relationship.status == RelationshipStatus::Active
            {
                relationship.status = RelationshipStatus::Suspended;
                relationship.updated_at = now;
            }
        }
        self.events.dispatch(&TrustEvent::GroupLeft {
            group: group_name.to_string(),
            org: org.to_string(),
        });
        Ok(())
    }

    /// Grant group admin to a member. Only existing admins may promote.
    pub fn promote(
        &self,
        group_name: &str,
        org: &str,
        acting_org: &str,
    ) -> Result<(), TrustError> {
        let mut state = self.write();
        let group = state
            .groups
            .get_mut(group_name)
            .ok_or_else(|| TrustError::NotFound(format!("group {group_name}")))?;
        if !group.is_admin(acting_org) {
            return Err(TrustError::AccessDenied(format!(
                "{acting_org} is not an admin of group {group_name}"
            )));
        }
        if !group.is_member(org) {
            return Err(TrustError::Validation(vec![format!(
                "{org} is not a member of group {group_name}"
            )]));
        }
        if !group.is_admin(org) {
            group.admins.push(org.to_string());
        }
        Ok(())
    }

    fn activate_group_edge(
        state: &mut EngineState,
        group_name: &str,
        source: &str,
        target: &str,
        level: &TrustLevel,
    ) {
        let existing = state.relationships.values_mut().find(|rel| {
            rel.group.as_deref() == Some(group_name)
                && rel.source_org == source
                && rel.target_org == target
        });
        let now = Utc::now();
        match existing {
            Some(rel) => {
                rel.status = RelationshipStatus::Active;
                rel.approved_by_source = true;
                rel.approved_by_target = true;
                rel.updated_at = now;
            }
            None => {
                let rel = TrustRelationship {
                    id: Uuid::new_v4(),
                    source_org: source.to_string(),
                    target_org: target.to_string(),
                    trust_level: level.name.clone(),
                    kind: RelationshipKind::Community,
                    approved_by_source: true,
                    approved_by_target: true,
                    source_approver: None,
                    target_approver: None,
                    status: RelationshipStatus::Active,
                    valid_from: now,
                    valid_until: None,
                    anonymization: level.anonymization,
                    access: level.access,
                    group: Some(group_name.to_string()),
                    created_by: source.to_string(),
                    created_at: now,
                    updated_at: now,
                    revoking_org: None,
                    revoked_by: None,
                    revoked_at: None,
                    revocation_reason: None,
                };
                state.relationships.insert(rel.id, rel);
            }
        }
    }
}

impl Default for TrustPolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryEventSink;
    use chrono::Duration;

    fn pending(engine: &TrustPolicyEngine) -> TrustRelationship {
        engine
            .create_relationship("org-a", "org-b", "standard", "org-a", CreateOptions::default())
            .unwrap()
    }

    #[test]
    fn creation_validations_are_collected() {
        let engine = TrustPolicyEngine::new();
        let err = engine
            .create_relationship("org-a", "org-a", "no-such-level", "org-a", CreateOptions::default())
            .unwrap_err();
        match err {
            TrustError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.contains("must differ")));
                assert!(errors.iter().any(|e| e.contains("unknown trust level")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_open_relationship_is_rejected() {
        let engine = TrustPolicyEngine::new();
        pending(&engine);
        assert!(engine
            .create_relationship("org-a", "org-b", "standard", "org-a", CreateOptions::default())
            .is_err());
        // Opposite direction is a distinct ordered pair.
        assert!(engine
            .create_relationship("org-b", "org-a", "standard", "org-b", CreateOptions::default())
            .is_ok());
    }

    #[test]
    fn activation_fires_exactly_once_in_either_order() {
        for order in [["org-a", "org-b"], ["org-b", "org-a"]] {
            let engine = TrustPolicyEngine::new();
            let rel = pending(&engine);
            assert!(!engine.approve(rel.id, order[0], "ops").unwrap());
            assert_eq!(
                engine.relationship(rel.id).unwrap().status,
                RelationshipStatus::Pending
            );
            assert!(engine.approve(rel.id, order[1], "ops").unwrap());
            assert_eq!(
                engine.relationship(rel.id).unwrap().status,
                RelationshipStatus::Active
            );
            // Re-approval from an already-approved side is a no-op.
            assert!(!engine.approve(rel.id, order[1], "ops").unwrap());
        }
    }

    #[test]
    fn approval_by_outsider_is_rejected() {
        let engine = TrustPolicyEngine::new();
        let rel = pending(&engine);
        assert!(engine.approve(rel.id, "org-c", "mallory").is_err());
    }

    #[test]
    fn revocation_is_terminal_and_idempotent() {
        let engine = TrustPolicyEngine::new();
        let rel = pending(&engine);
        assert!(engine.revoke(rel.id, "org-a", "alice", "policy change").unwrap());
        assert!(!engine.revoke(rel.id, "org-b", "bob", "again").unwrap());
        assert!(engine.approve(rel.id, "org-b", "bob").is_err());
        assert_eq!(
            engine.relationship(rel.id).unwrap().status,
            RelationshipStatus::Revoked
        );
    }

    #[test]
    fn suspend_and_reinstate_round_trip() {
        let engine = TrustPolicyEngine::new();
        let rel = pending(&engine);
        engine.approve(rel.id, "org-a", "alice").unwrap();
        engine.approve(rel.id, "org-b", "bob").unwrap();

        assert!(engine.suspend(rel.id, "org-a").unwrap());
        assert!(engine.resolve_trust("org-a", "org-b").is_none());
        assert!(engine.reinstate(rel.id, "org-b").unwrap());
        assert!(engine.resolve_trust("org-a", "org-b").is_some());
        // Suspending a pending relationship is a validation error.
        let other = engine
            .create_relationship("org-a", "org-c", "standard", "org-a", CreateOptions::default())
            .unwrap();
        assert!(engine.suspend(other.id, "org-a").is_err());
    }

    #[test]
    fn self_resolution_is_synthetic_full_trust() {
        let engine = TrustPolicyEngine::new();
        let resolved = engine.resolve_trust("org-a", "org-a").unwrap();
        assert_eq!(resolved.level.name, "full");
        assert_eq!(resolved.relationship.access, AccessLevel::Full);
        assert_eq!(resolved.relationship.anonymization, AnonymizationLevel::None);
    }

    #[test]
    fn pending_relationship_does_not_resolve() {
        let engine = TrustPolicyEngine::new();
        let rel = pending(&engine);
        engine.approve(rel.id, "org-a", "alice").unwrap();
        assert!(engine.resolve_trust("org-a", "org-b").is_none());
    }

    #[test]
    fn expiry_is_lazy_and_terminal() {
        let engine = TrustPolicyEngine::new();
        let rel = engine
            .create_relationship(
                "org-a",
                "org-b",
                "standard",
                "org-a",
                CreateOptions {
                    valid_until: Some(Utc::now() + Duration::hours(1)),
                    ..CreateOptions::default()
                },
            )
            .unwrap();
        engine.approve(rel.id, "org-a", "alice").unwrap();
        engine.approve(rel.id, "org-b", "bob").unwrap();
        assert!(engine.resolve_trust("org-a", "org-b").is_some());

        let later = Utc::now() + Duration::hours(2);
        assert!(engine.resolve_trust_at("org-a", "org-b", later).is_none());
        assert_eq!(
            engine.relationship(rel.id).unwrap().status,
            RelationshipStatus::Expired
        );
        assert!(engine.approve(rel.id, "org-a", "alice").is_err());
    }

    #[test]
    fn direct_edge_wins_over_group_edge() {
        let engine = TrustPolicyEngine::new();
        engine.create_group("isac", "sector group", "minimal", "org-a").unwrap();
        engine.join_group("isac", "org-b").unwrap();
        let via_group = engine.resolve_trust("org-a", "org-b").unwrap();
        assert_eq!(via_group.level.name, "minimal");
        assert_eq!(via_group.relationship.kind, RelationshipKind::Community);

        let direct = pending(&engine);
        engine.approve(direct.id, "org-a", "alice").unwrap();
        engine.approve(direct.id, "org-b", "bob").unwrap();
        let resolved = engine.resolve_trust("org-a", "org-b").unwrap();
        assert_eq!(resolved.level.name, "standard");
        assert!(resolved.relationship.group.is_none());
    }

    #[test]
    fn leaving_a_group_deactivates_only_group_edges() {
        let engine = TrustPolicyEngine::new();
        engine.create_group("isac", "", "moderate", "org-a").unwrap();
        engine.join_group("isac", "org-b").unwrap();
        let direct = pending(&engine);
        engine.approve(direct.id, "org-a", "alice").unwrap();
        engine.approve(direct.id, "org-b", "bob").unwrap();

        engine.leave_group("isac", "org-b").unwrap();
        let resolved = engine.resolve_trust("org-a", "org-b").unwrap();
        assert!(resolved.relationship.group.is_none());
        assert!(engine.resolve_trust("org-b", "org-a").is_none());

        // Rejoining reactivates the community edges.
        engine.join_group("isac", "org-b").unwrap();
        assert!(engine.resolve_trust("org-b", "org-a").is_some());
    }

    #[test]
    fn access_checks_compare_on_the_ordered_scale() {
        let engine = TrustPolicyEngine::new();
        let rel = engine
            .create_relationship("org-b", "org-a", "minimal", "org-b", CreateOptions::default())
            .unwrap();
        engine.approve(rel.id, "org-a", "alice").unwrap();
        engine.approve(rel.id, "org-b", "bob").unwrap();

        assert!(engine.can_access("org-b", "org-a", AccessLevel::Read).allowed);
        let denied = engine.can_access("org-b", "org-a", AccessLevel::Contribute);
        assert!(!denied.allowed);
        assert!(denied.reason.contains("below required"));
        assert!(denied.relationship.is_some());

        let no_edge = engine.can_access("org-c", "org-a", AccessLevel::Read);
        assert!(!no_edge.allowed);
        assert!(no_edge.relationship.is_none());
    }

    #[test]
    fn promote_requires_admin() {
        let engine = TrustPolicyEngine::new();
        engine.create_group("isac", "", "moderate", "org-a").unwrap();
        engine.join_group("isac", "org-b").unwrap();
        engine.join_group("isac", "org-c").unwrap();
        assert!(engine.promote("isac", "org-c", "org-b").is_err());
        engine.promote("isac", "org-b", "org-a").unwrap();
        assert!(engine.promote("isac", "org-c", "org-b").is_ok());
    }

    #[test]
    fn state_changes_reach_the_event_sink() {
        let sink = Arc::new(MemoryEventSink::new());
        let engine = TrustPolicyEngine::with_event_sink(sink.clone());
        let rel = pending(&engine);
        engine.approve(rel.id, "org-a", "alice").unwrap();
        engine.approve(rel.id, "org-b", "bob").unwrap();
        engine.revoke(rel.id, "org-a", "alice", "done").unwrap();

        let events = sink.events();
        assert!(events.iter().any(|e| matches!(e, TrustEvent::RelationshipCreated { .. })));
        assert_eq!(
            events.iter().filter(|e| matches!(e, TrustEvent::Activated { .. })).count(),
            1
        );
        assert!(matches!(events.last(), Some(TrustEvent::Revoked { .. })));
    }

    #[test]
    fn approvals_and_revocation_record_the_acting_user() {
        let engine = TrustPolicyEngine::new();
        let rel = pending(&engine);
        engine.approve(rel.id, "org-a", "alice").unwrap();
        engine.approve(rel.id, "org-b", "bob").unwrap();
        let active = engine.relationship(rel.id).unwrap();
        assert_eq!(active.source_approver.as_deref(), Some("alice"));
        assert_eq!(active.target_approver.as_deref(), Some("bob"));

        engine.revoke(rel.id, "org-b", "bob", "contract lapsed").unwrap();
        let revoked = engine.relationship(rel.id).unwrap();
        assert_eq!(revoked.revoking_org.as_deref(), Some("org-b"));
        assert_eq!(revoked.revoked_by.as_deref(), Some("bob"));
        assert_eq!(revoked.revocation_reason.as_deref(), Some("contract lapsed"));
    }

    #[test]
    fn approval_after_window_lapse_expires_instead_of_activating() {
        let engine = TrustPolicyEngine::new();
        let rel = engine
            .create_relationship(
                "org-a",
                "org-b",
                "standard",
                "org-a",
                CreateOptions {
                    valid_until: Some(Utc::now() - Duration::minutes(5)),
                    ..CreateOptions::default()
                },
            )
            .unwrap();
        assert!(engine.approve(rel.id, "org-a", "alice").is_err());
        assert_eq!(
            engine.relationship(rel.id).unwrap().status,
            RelationshipStatus::Expired
        );
    }

    #[test]
    fn highest_ranked_community_edge_wins_between_groups() {
        // Both orders of membership, so the winner cannot depend on
        // insertion or map iteration order.
        for groups in [["sector", "national"], ["national", "sector"]] {
            let engine = TrustPolicyEngine::new();
            engine.create_group("sector", "", "minimal", "org-a").unwrap();
            engine.create_group("national", "", "moderate", "org-a").unwrap();
            for group in groups {
                engine.join_group(group, "org-b").unwrap();
            }
            let resolved = engine.resolve_trust("org-a", "org-b").unwrap();
            assert_eq!(resolved.level.name, "moderate");
            assert_eq!(resolved.relationship.group.as_deref(), Some("national"));
        }
    }

    #[test]
    fn rank_uniqueness_is_enforced() {
        let engine = TrustPolicyEngine::new();
        let clashing = TrustLevel::new("partner", 75, AnonymizationLevel::Low, AccessLevel::Read);
        assert!(engine.define_level(clashing).is_err());
        let ok = TrustLevel::new("partner", 60, AnonymizationLevel::Low, AccessLevel::Read);
        assert!(engine.define_level(ok).is_ok());
        assert_eq!(engine.level("partner").unwrap().rank, 60);
    }
}
