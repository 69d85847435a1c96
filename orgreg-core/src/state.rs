//! The single authoritative registry state.
//!
//! [`RegistryState`] bundles the three entity stores and the tag index. It
//! serializes as flat record lists ([`Records`]); the tag index is never
//! persisted and is rebuilt from the records' own tag sets on load, so a
//! snapshot cannot carry an inconsistent index.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::events::RegistryEvent;
use crate::store::EntityStore;
use crate::tag_index::{Namespace, TagIndex};
use crate::transaction::Undo;
use crate::types::{
    Blob, EntityKind, Id, KeyBounds, OrgId, Organization, RepositoryId, ServiceId,
    ServiceRegistration, Tag, TypeRepositoryRegistration,
};

pub type ServiceKey = (OrgId, ServiceId);
pub type RepositoryKey = (OrgId, RepositoryId);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Records", try_from = "Records")]
pub struct RegistryState {
    pub(crate) organizations: EntityStore<OrgId, Organization>,
    pub(crate) services: EntityStore<ServiceKey, ServiceRegistration>,
    pub(crate) type_repositories: EntityStore<RepositoryKey, TypeRepositoryRegistration>,
    pub(crate) tags: TagIndex,
}

/// Persisted form of [`RegistryState`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Records {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub services: Vec<ServiceRegistration>,
    #[serde(default)]
    pub type_repositories: Vec<TypeRepositoryRegistration>,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn organizations(&self) -> &EntityStore<OrgId, Organization> {
        &self.organizations
    }

    pub fn services(&self) -> &EntityStore<ServiceKey, ServiceRegistration> {
        &self.services
    }

    pub fn type_repositories(&self) -> &EntityStore<RepositoryKey, TypeRepositoryRegistration> {
        &self.type_repositories
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    /// Rebuild state from records, rejecting dangling or duplicated references.
    pub fn from_records(records: Records) -> Result<Self, RegistryError> {
        let mut state = Self::new();
        for org in records.organizations {
            if org.id.0.is_zero() || org.owner.is_zero() {
                return Err(RegistryError::InvalidArgument(format!(
                    "organization {} has a zero id or owner",
                    org.id
                )));
            }
            if state.organizations.put(org.id, org.clone()).is_some() {
                return Err(RegistryError::already_exists(
                    EntityKind::Organization,
                    org.id,
                ));
            }
        }
        for service in records.services {
            load_listing(&mut state, service)?;
        }
        for repo in records.type_repositories {
            load_listing(&mut state, repo)?;
        }
        state.check_invariants()?;
        Ok(state)
    }

    pub fn to_records(&self) -> Records {
        Records {
            organizations: self.organizations.values().cloned().collect(),
            services: self.services.values().cloned().collect(),
            type_repositories: self.type_repositories.values().cloned().collect(),
        }
    }

    /// Verify referential integrity and forward/reverse tag consistency.
    pub fn check_invariants(&self) -> Result<(), RegistryError> {
        for org in self.organizations.values() {
            let services: BTreeSet<ServiceId> =
                self.services.list_keys_in(org.id).into_iter().collect();
            if services != org.service_ids {
                return Err(violation(format!(
                    "organization {} service list does not match stored services",
                    org.id
                )));
            }
            let repos: BTreeSet<RepositoryId> = self
                .type_repositories
                .list_keys_in(org.id)
                .into_iter()
                .collect();
            if repos != org.repository_ids {
                return Err(violation(format!(
                    "organization {} repository list does not match stored repositories",
                    org.id
                )));
            }
        }
        check_listing_tags::<ServiceRegistration>(self)?;
        check_listing_tags::<TypeRepositoryRegistration>(self)?;
        Ok(())
    }
}

impl From<RegistryState> for Records {
    fn from(state: RegistryState) -> Self {
        state.to_records()
    }
}

impl TryFrom<Records> for RegistryState {
    type Error = RegistryError;

    fn try_from(records: Records) -> Result<Self, Self::Error> {
        Self::from_records(records)
    }
}

fn violation(message: String) -> RegistryError {
    RegistryError::InvalidArgument(format!("registry invariant violated: {message}"))
}

fn load_listing<L: Listing>(state: &mut RegistryState, listing: L) -> Result<(), RegistryError> {
    let (org_id, local) = listing.key();
    if !state.organizations.exists(&org_id) {
        return Err(RegistryError::not_found(EntityKind::Organization, org_id));
    }
    for tag in listing.tags() {
        state
            .tags
            .add_tag(L::NAMESPACE, *tag, org_id, local.into());
    }
    if L::store_mut(state).put((org_id, local), listing).is_some() {
        return Err(RegistryError::already_exists(L::KIND, local));
    }
    Ok(())
}

fn check_listing_tags<L: Listing>(state: &RegistryState) -> Result<(), RegistryError> {
    for listing in L::store(state).values() {
        let (org_id, local) = listing.key();
        for tag in listing.tags() {
            if !state.tags.contains(L::NAMESPACE, tag, org_id, local.into()) {
                return Err(violation(format!(
                    "{} {org_id}/{local} carries tag {tag} missing from the index",
                    L::KIND
                )));
            }
        }
    }
    for (tag, org_id, entity) in state.tags.entries(L::NAMESPACE) {
        let key = (org_id, L::LocalId::from(entity));
        let carries = L::store(state)
            .get(&key)
            .is_some_and(|listing| listing.tags().contains(&tag));
        if !carries {
            return Err(violation(format!(
                "index entry {tag} -> {org_id}/{entity} has no matching {}",
                L::KIND
            )));
        }
    }
    Ok(())
}

/// Shared shape of services and type repositories.
///
/// The registry logic for both kinds is written once against this trait; the
/// two impls only differ in which store, namespace and events they use.
pub(crate) trait Listing: Clone + Sized {
    type LocalId: Copy + Ord + std::fmt::Display + KeyBounds + From<Id> + Into<Id>;

    const KIND: EntityKind;
    const NAMESPACE: Namespace;

    fn new(org_id: OrgId, id: Self::LocalId, reference: Blob, tags: BTreeSet<Tag>) -> Self;
    fn key(&self) -> (OrgId, Self::LocalId);
    fn tags(&self) -> &BTreeSet<Tag>;
    fn tags_mut(&mut self) -> &mut BTreeSet<Tag>;
    fn set_reference(&mut self, reference: Blob);

    fn store(state: &RegistryState) -> &EntityStore<(OrgId, Self::LocalId), Self>;
    fn store_mut(state: &mut RegistryState) -> &mut EntityStore<(OrgId, Self::LocalId), Self>;
    fn children_mut(org: &mut Organization) -> &mut BTreeSet<Self::LocalId>;
    fn undo(key: (OrgId, Self::LocalId), previous: Option<Self>) -> Undo;

    fn created_event(&self) -> RegistryEvent;
    fn reference_modified_event(&self) -> RegistryEvent;
    fn tags_modified_event(key: (OrgId, Self::LocalId)) -> RegistryEvent;
    fn deleted_event(key: (OrgId, Self::LocalId)) -> RegistryEvent;
}

impl Listing for ServiceRegistration {
    type LocalId = ServiceId;

    const KIND: EntityKind = EntityKind::Service;
    const NAMESPACE: Namespace = Namespace::Services;

    fn new(org_id: OrgId, id: ServiceId, reference: Blob, tags: BTreeSet<Tag>) -> Self {
        Self {
            org_id,
            id,
            metadata_uri: reference,
            tags,
        }
    }

    fn key(&self) -> ServiceKey {
        (self.org_id, self.id)
    }

    fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut BTreeSet<Tag> {
        &mut self.tags
    }

    fn set_reference(&mut self, reference: Blob) {
        self.metadata_uri = reference;
    }

    fn store(state: &RegistryState) -> &EntityStore<ServiceKey, Self> {
        &state.services
    }

    fn store_mut(state: &mut RegistryState) -> &mut EntityStore<ServiceKey, Self> {
        &mut state.services
    }

    fn children_mut(org: &mut Organization) -> &mut BTreeSet<ServiceId> {
        &mut org.service_ids
    }

    fn undo(key: ServiceKey, previous: Option<Self>) -> Undo {
        Undo::Service(key, previous)
    }

    fn created_event(&self) -> RegistryEvent {
        RegistryEvent::ServiceCreated {
            org_id: self.org_id,
            service_id: self.id,
            metadata_uri: self.metadata_uri.clone(),
        }
    }

    fn reference_modified_event(&self) -> RegistryEvent {
        RegistryEvent::ServiceMetadataModified {
            org_id: self.org_id,
            service_id: self.id,
            metadata_uri: self.metadata_uri.clone(),
        }
    }

    fn tags_modified_event((org_id, service_id): ServiceKey) -> RegistryEvent {
        RegistryEvent::ServiceTagsModified { org_id, service_id }
    }

    fn deleted_event((org_id, service_id): ServiceKey) -> RegistryEvent {
        RegistryEvent::ServiceDeleted { org_id, service_id }
    }
}

impl Listing for TypeRepositoryRegistration {
    type LocalId = RepositoryId;

    const KIND: EntityKind = EntityKind::TypeRepository;
    const NAMESPACE: Namespace = Namespace::TypeRepositories;

    fn new(org_id: OrgId, id: RepositoryId, reference: Blob, tags: BTreeSet<Tag>) -> Self {
        Self {
            org_id,
            id,
            repository_uri: reference,
            tags,
        }
    }

    fn key(&self) -> RepositoryKey {
        (self.org_id, self.id)
    }

    fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    fn tags_mut(&mut self) -> &mut BTreeSet<Tag> {
        &mut self.tags
    }

    fn set_reference(&mut self, reference: Blob) {
        self.repository_uri = reference;
    }

    fn store(state: &RegistryState) -> &EntityStore<RepositoryKey, Self> {
        &state.type_repositories
    }

    fn store_mut(state: &mut RegistryState) -> &mut EntityStore<RepositoryKey, Self> {
        &mut state.type_repositories
    }

    fn children_mut(org: &mut Organization) -> &mut BTreeSet<RepositoryId> {
        &mut org.repository_ids
    }

    fn undo(key: RepositoryKey, previous: Option<Self>) -> Undo {
        Undo::TypeRepository(key, previous)
    }

    fn created_event(&self) -> RegistryEvent {
        RegistryEvent::TypeRepositoryCreated {
            org_id: self.org_id,
            repository_id: self.id,
        }
    }

    fn reference_modified_event(&self) -> RegistryEvent {
        RegistryEvent::TypeRepositoryModified {
            org_id: self.org_id,
            repository_id: self.id,
        }
    }

    fn tags_modified_event((org_id, repository_id): RepositoryKey) -> RegistryEvent {
        RegistryEvent::TypeRepositoryModified {
            org_id,
            repository_id,
        }
    }

    fn deleted_event((org_id, repository_id): RepositoryKey) -> RegistryEvent {
        RegistryEvent::TypeRepositoryDeleted {
            org_id,
            repository_id,
        }
    }
}
