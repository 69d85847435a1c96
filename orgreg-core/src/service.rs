//! The registry state machine.
//!
//! Every mutating call runs the same pipeline:
//!
//! ```text
//! guard (authorize) → validate → store / tag index (journaled) → events
//!                   → commit hook → commit
//! ```
//!
//! Any error before the transaction commits (including one returned by the
//! commit hook) rolls back every primitive step, so observers only ever see
//! whole transitions.

use std::collections::BTreeSet;

use crate::command::{Command, Query, QueryResult};
use crate::config::Policy;
use crate::error::RegistryError;
use crate::events::Receipt;
use crate::events::RegistryEvent;
use crate::guard::{authorize_org_owner, authorize_publisher};
use crate::interface::{Interface, InterfaceId};
use crate::state::{Listing, RegistryState};
use crate::tag_index::Namespace;
use crate::transaction::Transaction;
use crate::types::{
    Address, Blob, EntityKind, OrgId, Organization, RepositoryId, ServiceId, ServiceRegistration,
    Tag, TagMatches, TypeRepositoryRegistration,
};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    state: RegistryState,
    policy: Policy,
    /// Sequence number of the last committed operation.
    seq: u64,
}

impl Registry {
    pub fn new(policy: Policy) -> Self {
        Self {
            state: RegistryState::new(),
            policy,
            seq: 0,
        }
    }

    /// Resume from a snapshot taken after operation `seq`.
    pub fn restore(state: RegistryState, seq: u64, policy: Policy) -> Self {
        Self { state, policy, seq }
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    pub fn execute(&mut self, caller: Address, command: &Command) -> Result<Receipt, RegistryError> {
        self.execute_with(caller, command, |_| Ok(()))
    }

    /// Apply `command`, then run `commit` with the pending receipt before the
    /// transition becomes visible. A hook error rolls the transition back.
    pub fn execute_with<F>(
        &mut self,
        caller: Address,
        command: &Command,
        commit: F,
    ) -> Result<Receipt, RegistryError>
    where
        F: FnOnce(&Receipt) -> Result<(), RegistryError>,
    {
        let seq = self.seq + 1;
        let mut tx = Transaction::new(&mut self.state);
        apply(&mut tx, &self.policy, caller, command)?;

        let receipt = Receipt {
            seq,
            events: tx.events().to_vec(),
        };
        commit(&receipt)?;
        tx.commit();
        self.seq = seq;

        tracing::debug!(
            seq,
            op = command.name(),
            caller = %caller,
            events = receipt.events.len(),
            "registry transition committed"
        );
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Organization lifecycle
    // -----------------------------------------------------------------------

    pub fn create_organization(
        &mut self,
        caller: Address,
        org_id: OrgId,
        name: impl Into<String>,
        members: Vec<Address>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::CreateOrganization {
                org_id,
                name: name.into(),
                members,
            },
        )
    }

    pub fn change_organization_owner(
        &mut self,
        caller: Address,
        org_id: OrgId,
        new_owner: Address,
    ) -> Result<Receipt, RegistryError> {
        self.execute(caller, &Command::ChangeOrganizationOwner { org_id, new_owner })
    }

    pub fn change_organization_name(
        &mut self,
        caller: Address,
        org_id: OrgId,
        name: impl Into<String>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::ChangeOrganizationName {
                org_id,
                name: name.into(),
            },
        )
    }

    pub fn add_organization_members(
        &mut self,
        caller: Address,
        org_id: OrgId,
        members: Vec<Address>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(caller, &Command::AddOrganizationMembers { org_id, members })
    }

    pub fn remove_organization_members(
        &mut self,
        caller: Address,
        org_id: OrgId,
        members: Vec<Address>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(caller, &Command::RemoveOrganizationMembers { org_id, members })
    }

    pub fn delete_organization(
        &mut self,
        caller: Address,
        org_id: OrgId,
    ) -> Result<Receipt, RegistryError> {
        self.execute(caller, &Command::DeleteOrganization { org_id })
    }

    // -----------------------------------------------------------------------
    // Service lifecycle
    // -----------------------------------------------------------------------

    pub fn create_service_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        service_id: ServiceId,
        metadata_uri: impl Into<Blob>,
        tags: Vec<Tag>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::CreateServiceRegistration {
                org_id,
                service_id,
                metadata_uri: metadata_uri.into(),
                tags,
            },
        )
    }

    pub fn update_service_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        service_id: ServiceId,
        metadata_uri: impl Into<Blob>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::UpdateServiceRegistration {
                org_id,
                service_id,
                metadata_uri: metadata_uri.into(),
            },
        )
    }

    pub fn add_tags_to_service_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        service_id: ServiceId,
        tags: Vec<Tag>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::AddTagsToServiceRegistration {
                org_id,
                service_id,
                tags,
            },
        )
    }

    pub fn remove_tags_from_service_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        service_id: ServiceId,
        tags: Vec<Tag>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::RemoveTagsFromServiceRegistration {
                org_id,
                service_id,
                tags,
            },
        )
    }

    pub fn delete_service_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        service_id: ServiceId,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::DeleteServiceRegistration { org_id, service_id },
        )
    }

    // -----------------------------------------------------------------------
    // Type-repository lifecycle
    // -----------------------------------------------------------------------

    pub fn create_type_repository_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        repository_id: RepositoryId,
        repository_uri: impl Into<Blob>,
        tags: Vec<Tag>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::CreateTypeRepositoryRegistration {
                org_id,
                repository_id,
                repository_uri: repository_uri.into(),
                tags,
            },
        )
    }

    pub fn update_type_repository_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        repository_id: RepositoryId,
        repository_uri: impl Into<Blob>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::UpdateTypeRepositoryRegistration {
                org_id,
                repository_id,
                repository_uri: repository_uri.into(),
            },
        )
    }

    pub fn add_tags_to_type_repository_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        repository_id: RepositoryId,
        tags: Vec<Tag>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::AddTagsToTypeRepositoryRegistration {
                org_id,
                repository_id,
                tags,
            },
        )
    }

    pub fn remove_tags_from_type_repository_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        repository_id: RepositoryId,
        tags: Vec<Tag>,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::RemoveTagsFromTypeRepositoryRegistration {
                org_id,
                repository_id,
                tags,
            },
        )
    }

    pub fn delete_type_repository_registration(
        &mut self,
        caller: Address,
        org_id: OrgId,
        repository_id: RepositoryId,
    ) -> Result<Receipt, RegistryError> {
        self.execute(
            caller,
            &Command::DeleteTypeRepositoryRegistration {
                org_id,
                repository_id,
            },
        )
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn list_organizations(&self) -> Vec<OrgId> {
        self.state.organizations.list_keys().copied().collect()
    }

    pub fn get_organization_by_id(&self, org_id: &OrgId) -> Option<&Organization> {
        self.state.organizations.get(org_id)
    }

    pub fn list_services_for_organization(&self, org_id: &OrgId) -> Option<Vec<ServiceId>> {
        self.state
            .organizations
            .get(org_id)
            .map(|org| org.service_ids.iter().copied().collect())
    }

    pub fn get_service_registration_by_id(
        &self,
        org_id: &OrgId,
        service_id: &ServiceId,
    ) -> Option<&ServiceRegistration> {
        self.state.services.get(&(*org_id, *service_id))
    }

    pub fn list_type_repositories_for_organization(
        &self,
        org_id: &OrgId,
    ) -> Option<Vec<RepositoryId>> {
        self.state
            .organizations
            .get(org_id)
            .map(|org| org.repository_ids.iter().copied().collect())
    }

    pub fn get_type_repository_by_id(
        &self,
        org_id: &OrgId,
        repository_id: &RepositoryId,
    ) -> Option<&TypeRepositoryRegistration> {
        self.state.type_repositories.get(&(*org_id, *repository_id))
    }

    pub fn list_service_tags(&self) -> Vec<Tag> {
        self.state.tags.list_tags(Namespace::Services)
    }

    pub fn list_services_for_tag(&self, tag: &Tag) -> TagMatches<ServiceId> {
        self.state
            .tags
            .list_entities_for_tag(Namespace::Services, tag)
            .into_iter()
            .map(|(org, id)| (org, ServiceId(id)))
            .collect()
    }

    pub fn list_type_repository_tags(&self) -> Vec<Tag> {
        self.state.tags.list_tags(Namespace::TypeRepositories)
    }

    pub fn list_type_repositories_for_tag(&self, tag: &Tag) -> TagMatches<RepositoryId> {
        self.state
            .tags
            .list_entities_for_tag(Namespace::TypeRepositories, tag)
            .into_iter()
            .map(|(org, id)| (org, RepositoryId(id)))
            .collect()
    }

    pub fn supports_interface(&self, interface_id: InterfaceId) -> bool {
        interface_id != InterfaceId::INVALID
            && Interface::ALL.iter().any(|i| i.id() == interface_id)
    }

    /// Answer any read operation. Never fails; missing entities are `None`.
    pub fn query(&self, query: &Query) -> QueryResult {
        match query {
            Query::ListOrganizations => QueryResult::Organizations {
                org_ids: self.list_organizations(),
            },
            Query::GetOrganizationById { org_id } => QueryResult::Organization {
                organization: self.get_organization_by_id(org_id).cloned(),
            },
            Query::ListServicesForOrganization { org_id } => QueryResult::ServiceIds {
                service_ids: self.list_services_for_organization(org_id),
            },
            Query::GetServiceRegistrationById { org_id, service_id } => QueryResult::Service {
                service: self
                    .get_service_registration_by_id(org_id, service_id)
                    .cloned(),
            },
            Query::ListTypeRepositoriesForOrganization { org_id } => {
                QueryResult::RepositoryIds {
                    repository_ids: self.list_type_repositories_for_organization(org_id),
                }
            }
            Query::GetTypeRepositoryById {
                org_id,
                repository_id,
            } => QueryResult::TypeRepository {
                repository: self.get_type_repository_by_id(org_id, repository_id).cloned(),
            },
            Query::ListServiceTags => QueryResult::Tags {
                tags: self.list_service_tags(),
            },
            Query::ListServicesForTag { tag } => QueryResult::Services {
                matches: self.list_services_for_tag(tag),
            },
            Query::ListTypeRepositoryTags => QueryResult::Tags {
                tags: self.list_type_repository_tags(),
            },
            Query::ListTypeRepositoriesForTag { tag } => QueryResult::TypeRepositories {
                matches: self.list_type_repositories_for_tag(tag),
            },
            Query::SupportsInterface { interface_id } => QueryResult::Supported {
                supported: self.supports_interface(*interface_id),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

fn apply(
    tx: &mut Transaction<'_>,
    policy: &Policy,
    caller: Address,
    command: &Command,
) -> Result<(), RegistryError> {
    match command {
        Command::CreateOrganization {
            org_id,
            name,
            members,
        } => create_organization(tx, policy, caller, *org_id, name, members),
        Command::ChangeOrganizationOwner { org_id, new_owner } => {
            let mut org = authorize_org_owner(tx.state(), &caller, org_id)?.clone();
            if new_owner.is_zero() {
                return Err(RegistryError::InvalidArgument(
                    "new owner must not be the zero address".to_string(),
                ));
            }
            org.owner = *new_owner;
            tx.put_organization(org);
            tx.emit(RegistryEvent::OrganizationModified { org_id: *org_id });
            Ok(())
        }
        Command::ChangeOrganizationName { org_id, name } => {
            let mut org = authorize_org_owner(tx.state(), &caller, org_id)?.clone();
            validate_name(policy, name)?;
            org.name = name.clone();
            tx.put_organization(org);
            tx.emit(RegistryEvent::OrganizationModified { org_id: *org_id });
            Ok(())
        }
        Command::AddOrganizationMembers { org_id, members } => {
            let mut org = authorize_org_owner(tx.state(), &caller, org_id)?.clone();
            validate_members(policy, members)?;
            org.members.extend(members.iter().copied());
            tx.put_organization(org);
            tx.emit(RegistryEvent::OrganizationModified { org_id: *org_id });
            Ok(())
        }
        Command::RemoveOrganizationMembers { org_id, members } => {
            let mut org = authorize_org_owner(tx.state(), &caller, org_id)?.clone();
            validate_batch(policy, members.len(), "members")?;
            for member in members {
                org.members.remove(member);
            }
            tx.put_organization(org);
            tx.emit(RegistryEvent::OrganizationModified { org_id: *org_id });
            Ok(())
        }
        Command::DeleteOrganization { org_id } => delete_organization(tx, caller, *org_id),
        Command::CreateServiceRegistration {
            org_id,
            service_id,
            metadata_uri,
            tags,
        } => create_listing::<ServiceRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *service_id),
            metadata_uri,
            tags,
        ),
        Command::UpdateServiceRegistration {
            org_id,
            service_id,
            metadata_uri,
        } => update_listing::<ServiceRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *service_id),
            metadata_uri,
        ),
        Command::AddTagsToServiceRegistration {
            org_id,
            service_id,
            tags,
        } => retag_listing::<ServiceRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *service_id),
            tags,
            Retag::Add,
        ),
        Command::RemoveTagsFromServiceRegistration {
            org_id,
            service_id,
            tags,
        } => retag_listing::<ServiceRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *service_id),
            tags,
            Retag::Remove,
        ),
        Command::DeleteServiceRegistration { org_id, service_id } => {
            delete_listing::<ServiceRegistration>(tx, policy, caller, (*org_id, *service_id))
        }
        Command::CreateTypeRepositoryRegistration {
            org_id,
            repository_id,
            repository_uri,
            tags,
        } => create_listing::<TypeRepositoryRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *repository_id),
            repository_uri,
            tags,
        ),
        Command::UpdateTypeRepositoryRegistration {
            org_id,
            repository_id,
            repository_uri,
        } => update_listing::<TypeRepositoryRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *repository_id),
            repository_uri,
        ),
        Command::AddTagsToTypeRepositoryRegistration {
            org_id,
            repository_id,
            tags,
        } => retag_listing::<TypeRepositoryRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *repository_id),
            tags,
            Retag::Add,
        ),
        Command::RemoveTagsFromTypeRepositoryRegistration {
            org_id,
            repository_id,
            tags,
        } => retag_listing::<TypeRepositoryRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *repository_id),
            tags,
            Retag::Remove,
        ),
        Command::DeleteTypeRepositoryRegistration {
            org_id,
            repository_id,
        } => delete_listing::<TypeRepositoryRegistration>(
            tx,
            policy,
            caller,
            (*org_id, *repository_id),
        ),
    }
}

fn create_organization(
    tx: &mut Transaction<'_>,
    policy: &Policy,
    caller: Address,
    org_id: OrgId,
    name: &str,
    members: &[Address],
) -> Result<(), RegistryError> {
    if org_id.0.is_zero() {
        return Err(RegistryError::InvalidArgument(
            "organization id must not be zero".to_string(),
        ));
    }
    if caller.is_zero() {
        return Err(RegistryError::InvalidArgument(
            "the zero address cannot own an organization".to_string(),
        ));
    }
    validate_name(policy, name)?;
    validate_members(policy, members)?;
    if tx.state().organizations.exists(&org_id) {
        return Err(RegistryError::already_exists(
            EntityKind::Organization,
            org_id,
        ));
    }

    tx.put_organization(Organization {
        id: org_id,
        name: name.to_string(),
        owner: caller,
        members: members.iter().copied().collect(),
        service_ids: BTreeSet::new(),
        repository_ids: BTreeSet::new(),
    });
    tx.emit(RegistryEvent::OrganizationCreated { org_id });
    Ok(())
}

/// Cascade: de-index and delete every child, then the organization itself.
fn delete_organization(
    tx: &mut Transaction<'_>,
    caller: Address,
    org_id: OrgId,
) -> Result<(), RegistryError> {
    let org = authorize_org_owner(tx.state(), &caller, &org_id)?.clone();

    for service_id in &org.service_ids {
        remove_listing::<ServiceRegistration>(tx, (org_id, *service_id))?;
    }
    for repository_id in &org.repository_ids {
        remove_listing::<TypeRepositoryRegistration>(tx, (org_id, *repository_id))?;
    }
    tx.delete_organization(org_id);
    tx.emit(RegistryEvent::OrganizationDeleted { org_id });
    Ok(())
}

fn create_listing<L: Listing>(
    tx: &mut Transaction<'_>,
    policy: &Policy,
    caller: Address,
    key: (OrgId, L::LocalId),
    reference: &Blob,
    tags: &[Tag],
) -> Result<(), RegistryError> {
    let mut org = authorize_publisher(policy.publishers, tx.state(), &caller, &key.0)?.clone();
    validate_local_id::<L>(key.1)?;
    validate_tags(policy, tags)?;
    if L::store(tx.state()).exists(&key) {
        return Err(RegistryError::already_exists(
            L::KIND,
            format!("{}/{}", key.0, key.1),
        ));
    }

    let listing = L::new(key.0, key.1, reference.clone(), tags.iter().copied().collect());
    for tag in listing.tags() {
        tx.index_tag(L::NAMESPACE, *tag, key.0, key.1.into());
    }
    let event = listing.created_event();
    tx.put_listing(listing);
    L::children_mut(&mut org).insert(key.1);
    tx.put_organization(org);
    tx.emit(event);
    Ok(())
}

fn update_listing<L: Listing>(
    tx: &mut Transaction<'_>,
    policy: &Policy,
    caller: Address,
    key: (OrgId, L::LocalId),
    reference: &Blob,
) -> Result<(), RegistryError> {
    authorize_publisher(policy.publishers, tx.state(), &caller, &key.0)?;
    let mut listing = existing_listing::<L>(tx, key)?;
    listing.set_reference(reference.clone());
    let event = listing.reference_modified_event();
    tx.put_listing(listing);
    tx.emit(event);
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Retag {
    Add,
    Remove,
}

fn retag_listing<L: Listing>(
    tx: &mut Transaction<'_>,
    policy: &Policy,
    caller: Address,
    key: (OrgId, L::LocalId),
    tags: &[Tag],
    mode: Retag,
) -> Result<(), RegistryError> {
    authorize_publisher(policy.publishers, tx.state(), &caller, &key.0)?;
    let mut listing = existing_listing::<L>(tx, key)?;
    match mode {
        Retag::Add => validate_tags(policy, tags)?,
        Retag::Remove => validate_batch(policy, tags.len(), "tags")?,
    }

    for tag in tags {
        match mode {
            Retag::Add => {
                if listing.tags_mut().insert(*tag) {
                    tx.index_tag(L::NAMESPACE, *tag, key.0, key.1.into());
                }
            }
            Retag::Remove => {
                if listing.tags_mut().remove(tag) {
                    tx.unindex_tag(L::NAMESPACE, *tag, key.0, key.1.into());
                }
            }
        }
    }
    tx.put_listing(listing);
    tx.emit(L::tags_modified_event(key));
    Ok(())
}

fn delete_listing<L: Listing>(
    tx: &mut Transaction<'_>,
    policy: &Policy,
    caller: Address,
    key: (OrgId, L::LocalId),
) -> Result<(), RegistryError> {
    let mut org = authorize_publisher(policy.publishers, tx.state(), &caller, &key.0)?.clone();
    remove_listing::<L>(tx, key)?;
    L::children_mut(&mut org).remove(&key.1);
    tx.put_organization(org);
    Ok(())
}

/// De-index and delete one child record, emitting its deletion event.
/// Leaves the parent organization's child list to the caller.
fn remove_listing<L: Listing>(
    tx: &mut Transaction<'_>,
    key: (OrgId, L::LocalId),
) -> Result<(), RegistryError> {
    let listing = existing_listing::<L>(tx, key)?;
    for tag in listing.tags() {
        tx.unindex_tag(L::NAMESPACE, *tag, key.0, key.1.into());
    }
    tx.delete_listing::<L>(key);
    tx.emit(L::deleted_event(key));
    Ok(())
}

fn existing_listing<L: Listing>(
    tx: &Transaction<'_>,
    key: (OrgId, L::LocalId),
) -> Result<L, RegistryError> {
    L::store(tx.state())
        .get(&key)
        .cloned()
        .ok_or_else(|| RegistryError::not_found(L::KIND, format!("{}/{}", key.0, key.1)))
}

// ---------------------------------------------------------------------------
// Argument validation
// ---------------------------------------------------------------------------

fn validate_name(policy: &Policy, name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() {
        return Err(RegistryError::InvalidArgument(
            "organization name must not be empty".to_string(),
        ));
    }
    if name.len() > policy.max_name_len {
        return Err(RegistryError::InvalidArgument(format!(
            "organization name exceeds {} bytes",
            policy.max_name_len
        )));
    }
    Ok(())
}

fn validate_batch(policy: &Policy, len: usize, what: &str) -> Result<(), RegistryError> {
    if len > policy.max_batch {
        return Err(RegistryError::InvalidArgument(format!(
            "{len} {what} exceeds the batch limit of {}",
            policy.max_batch
        )));
    }
    Ok(())
}

fn validate_members(policy: &Policy, members: &[Address]) -> Result<(), RegistryError> {
    validate_batch(policy, members.len(), "members")?;
    if members.iter().any(Address::is_zero) {
        return Err(RegistryError::InvalidArgument(
            "the zero address cannot be a member".to_string(),
        ));
    }
    Ok(())
}

fn validate_tags(policy: &Policy, tags: &[Tag]) -> Result<(), RegistryError> {
    validate_batch(policy, tags.len(), "tags")?;
    if tags.iter().any(|tag| tag.0.is_zero()) {
        return Err(RegistryError::InvalidArgument(
            "tags must not be zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_local_id<L: Listing>(id: L::LocalId) -> Result<(), RegistryError> {
    if id.into().is_zero() {
        return Err(RegistryError::InvalidArgument(format!(
            "{} id must not be zero",
            L::KIND
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Address = Address([0xa1; 20]);
    const B: Address = Address([0xb2; 20]);

    fn org(s: &str) -> OrgId {
        OrgId::from_label(s).unwrap()
    }
    fn svc(s: &str) -> ServiceId {
        ServiceId::from_label(s).unwrap()
    }
    fn tag(s: &str) -> Tag {
        Tag::from_label(s).unwrap()
    }

    #[test]
    fn sequence_advances_only_on_commit() {
        let mut registry = Registry::default();
        let r1 = registry.create_organization(A, org("o1"), "One", vec![]).unwrap();
        assert_eq!(r1.seq, 1);
        assert!(registry
            .create_organization(A, org("o1"), "Again", vec![])
            .is_err());
        assert_eq!(registry.seq(), 1);
        let r2 = registry.create_organization(A, org("o2"), "Two", vec![]).unwrap();
        assert_eq!(r2.seq, 2);
    }

    #[test]
    fn failing_commit_hook_rolls_back() {
        let mut registry = Registry::default();
        registry.create_organization(A, org("o1"), "One", vec![B]).unwrap();
        registry
            .create_service_registration(A, org("o1"), svc("s1"), "m", vec![tag("t1")])
            .unwrap();
        let before = registry.state().clone();

        let err = registry
            .execute_with(
                A,
                &Command::DeleteOrganization { org_id: org("o1") },
                |_| Err(RegistryError::Commit("disk full".into())),
            )
            .unwrap_err();

        assert!(matches!(err, RegistryError::Commit(_)));
        assert_eq!(registry.state(), &before);
        assert_eq!(registry.seq(), 2);
        registry.state().check_invariants().unwrap();
    }

    #[test]
    fn commit_hook_sees_pending_events() {
        let mut registry = Registry::default();
        let mut seen = Vec::new();
        registry
            .execute_with(
                A,
                &Command::CreateOrganization {
                    org_id: org("o1"),
                    name: "One".into(),
                    members: vec![],
                },
                |receipt| {
                    seen = receipt.events.clone();
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(
            seen,
            vec![RegistryEvent::OrganizationCreated { org_id: org("o1") }]
        );
    }

    #[test]
    fn query_dispatch_matches_direct_reads() {
        let mut registry = Registry::default();
        registry.create_organization(A, org("o1"), "One", vec![]).unwrap();
        registry
            .create_service_registration(A, org("o1"), svc("s1"), "m", vec![tag("t1")])
            .unwrap();

        let result = registry.query(&Query::ListServicesForTag { tag: tag("t1") });
        assert_eq!(
            result,
            QueryResult::Services {
                matches: registry.list_services_for_tag(&tag("t1"))
            }
        );
        let missing = registry.query(&Query::GetOrganizationById { org_id: org("nope") });
        assert!(!missing.found());
    }

    #[test]
    fn supports_every_advertised_interface() {
        let registry = Registry::default();
        for interface in Interface::ALL {
            assert!(registry.supports_interface(interface.id()), "{interface:?}");
        }
        assert!(!registry.supports_interface(InterfaceId::INVALID));
        assert!(!registry.supports_interface(InterfaceId([0, 0, 0, 0])));
    }
}
