//! Transport-agnostic operation values.
//!
//! [`Command`] names every mutating operation and [`Query`] every read. The
//! same values are written to the ledger, sent over the daemon socket and
//! built by the CLI.

use serde::{Deserialize, Serialize};

use crate::interface::InterfaceId;
use crate::types::{
    Address, Blob, OrgId, Organization, RepositoryId, ServiceId, ServiceRegistration, Tag,
    TagMatches, TypeRepositoryRegistration,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateOrganization {
        org_id: OrgId,
        name: String,
        #[serde(default)]
        members: Vec<Address>,
    },
    ChangeOrganizationOwner {
        org_id: OrgId,
        new_owner: Address,
    },
    ChangeOrganizationName {
        org_id: OrgId,
        name: String,
    },
    AddOrganizationMembers {
        org_id: OrgId,
        members: Vec<Address>,
    },
    RemoveOrganizationMembers {
        org_id: OrgId,
        members: Vec<Address>,
    },
    DeleteOrganization {
        org_id: OrgId,
    },
    CreateServiceRegistration {
        org_id: OrgId,
        service_id: ServiceId,
        metadata_uri: Blob,
        #[serde(default)]
        tags: Vec<Tag>,
    },
    UpdateServiceRegistration {
        org_id: OrgId,
        service_id: ServiceId,
        metadata_uri: Blob,
    },
    AddTagsToServiceRegistration {
        org_id: OrgId,
        service_id: ServiceId,
        tags: Vec<Tag>,
    },
    RemoveTagsFromServiceRegistration {
        org_id: OrgId,
        service_id: ServiceId,
        tags: Vec<Tag>,
    },
    DeleteServiceRegistration {
        org_id: OrgId,
        service_id: ServiceId,
    },
    CreateTypeRepositoryRegistration {
        org_id: OrgId,
        repository_id: RepositoryId,
        repository_uri: Blob,
        #[serde(default)]
        tags: Vec<Tag>,
    },
    UpdateTypeRepositoryRegistration {
        org_id: OrgId,
        repository_id: RepositoryId,
        repository_uri: Blob,
    },
    AddTagsToTypeRepositoryRegistration {
        org_id: OrgId,
        repository_id: RepositoryId,
        tags: Vec<Tag>,
    },
    RemoveTagsFromTypeRepositoryRegistration {
        org_id: OrgId,
        repository_id: RepositoryId,
        tags: Vec<Tag>,
    },
    DeleteTypeRepositoryRegistration {
        org_id: OrgId,
        repository_id: RepositoryId,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateOrganization { .. } => "create_organization",
            Command::ChangeOrganizationOwner { .. } => "change_organization_owner",
            Command::ChangeOrganizationName { .. } => "change_organization_name",
            Command::AddOrganizationMembers { .. } => "add_organization_members",
            Command::RemoveOrganizationMembers { .. } => "remove_organization_members",
            Command::DeleteOrganization { .. } => "delete_organization",
            Command::CreateServiceRegistration { .. } => "create_service_registration",
            Command::UpdateServiceRegistration { .. } => "update_service_registration",
            Command::AddTagsToServiceRegistration { .. } => "add_tags_to_service_registration",
            Command::RemoveTagsFromServiceRegistration { .. } => {
                "remove_tags_from_service_registration"
            }
            Command::DeleteServiceRegistration { .. } => "delete_service_registration",
            Command::CreateTypeRepositoryRegistration { .. } => {
                "create_type_repository_registration"
            }
            Command::UpdateTypeRepositoryRegistration { .. } => {
                "update_type_repository_registration"
            }
            Command::AddTagsToTypeRepositoryRegistration { .. } => {
                "add_tags_to_type_repository_registration"
            }
            Command::RemoveTagsFromTypeRepositoryRegistration { .. } => {
                "remove_tags_from_type_repository_registration"
            }
            Command::DeleteTypeRepositoryRegistration { .. } => {
                "delete_type_repository_registration"
            }
        }
    }

    pub fn org_id(&self) -> OrgId {
        match self {
            Command::CreateOrganization { org_id, .. }
            | Command::ChangeOrganizationOwner { org_id, .. }
            | Command::ChangeOrganizationName { org_id, .. }
            | Command::AddOrganizationMembers { org_id, .. }
            | Command::RemoveOrganizationMembers { org_id, .. }
            | Command::DeleteOrganization { org_id }
            | Command::CreateServiceRegistration { org_id, .. }
            | Command::UpdateServiceRegistration { org_id, .. }
            | Command::AddTagsToServiceRegistration { org_id, .. }
            | Command::RemoveTagsFromServiceRegistration { org_id, .. }
            | Command::DeleteServiceRegistration { org_id, .. }
            | Command::CreateTypeRepositoryRegistration { org_id, .. }
            | Command::UpdateTypeRepositoryRegistration { org_id, .. }
            | Command::AddTagsToTypeRepositoryRegistration { org_id, .. }
            | Command::RemoveTagsFromTypeRepositoryRegistration { org_id, .. }
            | Command::DeleteTypeRepositoryRegistration { org_id, .. } => *org_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum Query {
    ListOrganizations,
    GetOrganizationById {
        org_id: OrgId,
    },
    ListServicesForOrganization {
        org_id: OrgId,
    },
    GetServiceRegistrationById {
        org_id: OrgId,
        service_id: ServiceId,
    },
    ListTypeRepositoriesForOrganization {
        org_id: OrgId,
    },
    GetTypeRepositoryById {
        org_id: OrgId,
        repository_id: RepositoryId,
    },
    ListServiceTags,
    ListServicesForTag {
        tag: Tag,
    },
    ListTypeRepositoryTags,
    ListTypeRepositoriesForTag {
        tag: Tag,
    },
    SupportsInterface {
        interface_id: InterfaceId,
    },
}

/// Answer to a [`Query`]. `None` payloads mean "not found".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum QueryResult {
    Organizations {
        org_ids: Vec<OrgId>,
    },
    Organization {
        organization: Option<Organization>,
    },
    ServiceIds {
        service_ids: Option<Vec<ServiceId>>,
    },
    Service {
        service: Option<ServiceRegistration>,
    },
    RepositoryIds {
        repository_ids: Option<Vec<RepositoryId>>,
    },
    TypeRepository {
        repository: Option<TypeRepositoryRegistration>,
    },
    Tags {
        tags: Vec<Tag>,
    },
    Services {
        matches: TagMatches<ServiceId>,
    },
    TypeRepositories {
        matches: TagMatches<RepositoryId>,
    },
    Supported {
        supported: bool,
    },
}

impl QueryResult {
    /// Whether the queried entity exists. List queries are always found.
    pub fn found(&self) -> bool {
        match self {
            QueryResult::Organization { organization } => organization.is_some(),
            QueryResult::ServiceIds { service_ids } => service_ids.is_some(),
            QueryResult::Service { service } => service.is_some(),
            QueryResult::RepositoryIds { repository_ids } => repository_ids.is_some(),
            QueryResult::TypeRepository { repository } => repository.is_some(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_json_is_tagged_by_op() {
        let cmd = Command::DeleteOrganization {
            org_id: OrgId::from_label("acme").unwrap(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["op"], "delete_organization");
        assert_eq!(cmd.name(), "delete_organization");
        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn create_organization_members_default_to_empty() {
        let org = OrgId::from_label("acme").unwrap();
        let json = serde_json::json!({
            "op": "create_organization",
            "org_id": org.0.to_hex(),
            "name": "Acme",
        });
        let cmd: Command = serde_json::from_value(json).unwrap();
        assert_eq!(
            cmd,
            Command::CreateOrganization {
                org_id: org,
                name: "Acme".into(),
                members: vec![],
            }
        );
    }

    #[test]
    fn query_accepts_label_ids() {
        let json = serde_json::json!({"query": "list_services_for_tag", "tag": "ml"});
        let query: Query = serde_json::from_value(json).unwrap();
        assert_eq!(
            query,
            Query::ListServicesForTag {
                tag: Tag::from_label("ml").unwrap()
            }
        );
    }
}
