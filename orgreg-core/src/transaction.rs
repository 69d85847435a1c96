//! Undo-journaled transaction over [`RegistryState`].
//!
//! Every primitive mutation records its inverse before returning. Dropping a
//! transaction that was not committed replays the journal backwards, so an
//! error anywhere in an operation (validation, a cascade step, or the durable
//! commit hook) leaves the state exactly as it was.

use crate::events::RegistryEvent;
use crate::state::{Listing, RegistryState, RepositoryKey, ServiceKey};
use crate::tag_index::Namespace;
use crate::types::{Id, OrgId, Organization, ServiceRegistration, Tag, TypeRepositoryRegistration};

/// Inverse of one primitive mutation.
#[derive(Debug)]
pub(crate) enum Undo {
    /// Restore the organization record that existed before (or remove it).
    Organization(OrgId, Option<Organization>),
    Service(ServiceKey, Option<ServiceRegistration>),
    TypeRepository(RepositoryKey, Option<TypeRepositoryRegistration>),
    TagAdded(Namespace, Tag, OrgId, Id),
    TagRemoved(Namespace, Tag, OrgId, Id),
}

pub(crate) struct Transaction<'a> {
    state: &'a mut RegistryState,
    journal: Vec<Undo>,
    events: Vec<RegistryEvent>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(state: &'a mut RegistryState) -> Self {
        Self {
            state,
            journal: Vec::new(),
            events: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> &RegistryState {
        self.state
    }

    pub(crate) fn put_organization(&mut self, org: Organization) {
        let id = org.id;
        let previous = self.state.organizations.put(id, org);
        self.journal.push(Undo::Organization(id, previous));
    }

    pub(crate) fn delete_organization(&mut self, id: OrgId) -> Option<Organization> {
        let previous = self.state.organizations.delete(&id);
        if let Some(org) = &previous {
            self.journal.push(Undo::Organization(id, Some(org.clone())));
        }
        previous
    }

    pub(crate) fn put_listing<L: Listing>(&mut self, listing: L) {
        let key = listing.key();
        let previous = L::store_mut(self.state).put(key, listing);
        self.journal.push(L::undo(key, previous));
    }

    pub(crate) fn delete_listing<L: Listing>(&mut self, key: (OrgId, L::LocalId)) -> Option<L> {
        let previous = L::store_mut(self.state).delete(&key);
        if let Some(listing) = &previous {
            self.journal.push(L::undo(key, Some(listing.clone())));
        }
        previous
    }

    pub(crate) fn index_tag(&mut self, ns: Namespace, tag: Tag, org: OrgId, entity: Id) {
        if self.state.tags.add_tag(ns, tag, org, entity) {
            self.journal.push(Undo::TagAdded(ns, tag, org, entity));
        }
    }

    pub(crate) fn unindex_tag(&mut self, ns: Namespace, tag: Tag, org: OrgId, entity: Id) {
        if self.state.tags.remove_tag(ns, tag, org, entity) {
            self.journal.push(Undo::TagRemoved(ns, tag, org, entity));
        }
    }

    pub(crate) fn emit(&mut self, event: RegistryEvent) {
        self.events.push(event);
    }

    pub(crate) fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    /// Keep every change and hand back the emitted events.
    pub(crate) fn commit(mut self) -> Vec<RegistryEvent> {
        self.journal.clear();
        std::mem::take(&mut self.events)
    }

    fn rollback(&mut self) {
        let steps = self.journal.len();
        while let Some(step) = self.journal.pop() {
            match step {
                Undo::Organization(id, Some(org)) => {
                    self.state.organizations.put(id, org);
                }
                Undo::Organization(id, None) => {
                    self.state.organizations.delete(&id);
                }
                Undo::Service(key, Some(service)) => {
                    self.state.services.put(key, service);
                }
                Undo::Service(key, None) => {
                    self.state.services.delete(&key);
                }
                Undo::TypeRepository(key, Some(repo)) => {
                    self.state.type_repositories.put(key, repo);
                }
                Undo::TypeRepository(key, None) => {
                    self.state.type_repositories.delete(&key);
                }
                Undo::TagAdded(ns, tag, org, entity) => {
                    self.state.tags.remove_tag(ns, tag, org, entity);
                }
                Undo::TagRemoved(ns, tag, org, entity) => {
                    self.state.tags.add_tag(ns, tag, org, entity);
                }
            }
        }
        self.events.clear();
        tracing::debug!(steps, "registry transaction rolled back");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.journal.is_empty() {
            self.rollback();
        }
    }
}
