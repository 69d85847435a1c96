//! Domain events emitted by committed registry transitions.

use serde::{Deserialize, Serialize};

use crate::types::{Blob, OrgId, RepositoryId, ServiceId};

/// One state transition, as seen by external indexers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    OrganizationCreated {
        org_id: OrgId,
    },
    OrganizationModified {
        org_id: OrgId,
    },
    OrganizationDeleted {
        org_id: OrgId,
    },
    ServiceCreated {
        org_id: OrgId,
        service_id: ServiceId,
        metadata_uri: Blob,
    },
    ServiceMetadataModified {
        org_id: OrgId,
        service_id: ServiceId,
        metadata_uri: Blob,
    },
    ServiceTagsModified {
        org_id: OrgId,
        service_id: ServiceId,
    },
    ServiceDeleted {
        org_id: OrgId,
        service_id: ServiceId,
    },
    TypeRepositoryCreated {
        org_id: OrgId,
        repository_id: RepositoryId,
    },
    TypeRepositoryModified {
        org_id: OrgId,
        repository_id: RepositoryId,
    },
    TypeRepositoryDeleted {
        org_id: OrgId,
        repository_id: RepositoryId,
    },
}

impl RegistryEvent {
    pub fn org_id(&self) -> OrgId {
        match self {
            RegistryEvent::OrganizationCreated { org_id }
            | RegistryEvent::OrganizationModified { org_id }
            | RegistryEvent::OrganizationDeleted { org_id }
            | RegistryEvent::ServiceCreated { org_id, .. }
            | RegistryEvent::ServiceMetadataModified { org_id, .. }
            | RegistryEvent::ServiceTagsModified { org_id, .. }
            | RegistryEvent::ServiceDeleted { org_id, .. }
            | RegistryEvent::TypeRepositoryCreated { org_id, .. }
            | RegistryEvent::TypeRepositoryModified { org_id, .. }
            | RegistryEvent::TypeRepositoryDeleted { org_id, .. } => *org_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::OrganizationCreated { .. } => "OrganizationCreated",
            RegistryEvent::OrganizationModified { .. } => "OrganizationModified",
            RegistryEvent::OrganizationDeleted { .. } => "OrganizationDeleted",
            RegistryEvent::ServiceCreated { .. } => "ServiceCreated",
            RegistryEvent::ServiceMetadataModified { .. } => "ServiceMetadataModified",
            RegistryEvent::ServiceTagsModified { .. } => "ServiceTagsModified",
            RegistryEvent::ServiceDeleted { .. } => "ServiceDeleted",
            RegistryEvent::TypeRepositoryCreated { .. } => "TypeRepositoryCreated",
            RegistryEvent::TypeRepositoryModified { .. } => "TypeRepositoryModified",
            RegistryEvent::TypeRepositoryDeleted { .. } => "TypeRepositoryDeleted",
        }
    }
}

/// Outcome of one committed operation.
///
/// `seq` numbers operations, not events: a cascade delete yields one receipt
/// with several events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub seq: u64,
    pub events: Vec<RegistryEvent>,
}
