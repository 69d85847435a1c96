//! Reverse index from tag to the entities carrying it.
//!
//! Services and type repositories live in separate namespaces and never share
//! buckets. A bucket exists only while it holds at least one entity, so
//! [`TagIndex::list_tags`] never reports a tag with no matches.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Id, OrgId, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Services,
    TypeRepositories,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Services => write!(f, "services"),
            Namespace::TypeRepositories => write!(f, "type_repositories"),
        }
    }
}

type Buckets = BTreeMap<Tag, BTreeSet<(OrgId, Id)>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    services: Buckets,
    type_repositories: Buckets,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn buckets(&self, ns: Namespace) -> &Buckets {
        match ns {
            Namespace::Services => &self.services,
            Namespace::TypeRepositories => &self.type_repositories,
        }
    }

    fn buckets_mut(&mut self, ns: Namespace) -> &mut Buckets {
        match ns {
            Namespace::Services => &mut self.services,
            Namespace::TypeRepositories => &mut self.type_repositories,
        }
    }

    /// Returns `true` if the pair was not already indexed under `tag`.
    pub fn add_tag(&mut self, ns: Namespace, tag: Tag, org: OrgId, entity: Id) -> bool {
        self.buckets_mut(ns)
            .entry(tag)
            .or_default()
            .insert((org, entity))
    }

    /// Returns `true` if the pair was indexed under `tag`. Prunes empty buckets.
    pub fn remove_tag(&mut self, ns: Namespace, tag: Tag, org: OrgId, entity: Id) -> bool {
        let buckets = self.buckets_mut(ns);
        let Some(bucket) = buckets.get_mut(&tag) else {
            return false;
        };
        let removed = bucket.remove(&(org, entity));
        if bucket.is_empty() {
            buckets.remove(&tag);
        }
        removed
    }

    pub fn contains(&self, ns: Namespace, tag: &Tag, org: OrgId, entity: Id) -> bool {
        self.buckets(ns)
            .get(tag)
            .is_some_and(|bucket| bucket.contains(&(org, entity)))
    }

    pub fn list_tags(&self, ns: Namespace) -> Vec<Tag> {
        self.buckets(ns).keys().copied().collect()
    }

    pub fn list_entities_for_tag(&self, ns: Namespace, tag: &Tag) -> Vec<(OrgId, Id)> {
        self.buckets(ns)
            .get(tag)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every `(tag, org, entity)` triple in a namespace.
    pub fn entries(&self, ns: Namespace) -> impl Iterator<Item = (Tag, OrgId, Id)> + '_ {
        self.buckets(ns)
            .iter()
            .flat_map(|(tag, bucket)| bucket.iter().map(move |(org, id)| (*tag, *org, *id)))
    }
}
