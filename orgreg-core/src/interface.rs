//! Capability probe.
//!
//! An interface id is the XOR of the 4-byte selectors of every operation in
//! the set, where a selector is the first four bytes of the SHA-256 digest of
//! the operation signature.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(pub [u8; 4]);

impl InterfaceId {
    /// Reserved id that no deployment may claim.
    pub const INVALID: InterfaceId = InterfaceId([0xff; 4]);
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InterfaceId({self})")
    }
}

impl FromStr for InterfaceId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; 4];
        hex::decode_to_slice(digits, &mut out).map_err(|e| {
            RegistryError::InvalidArgument(format!("malformed interface id '{s}': {e}"))
        })?;
        Ok(Self(out))
    }
}

impl Serialize for InterfaceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InterfaceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Sha256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn xor_selectors<'a>(signatures: impl IntoIterator<Item = &'a str>) -> InterfaceId {
    let mut out = [0u8; 4];
    for sig in signatures {
        for (acc, byte) in out.iter_mut().zip(selector(sig)) {
            *acc ^= byte;
        }
    }
    InterfaceId(out)
}

const INTROSPECTION: &[&str] = &["supportsInterface(bytes4)"];

const ORGANIZATIONS: &[&str] = &[
    "createOrganization(bytes32,string,address[])",
    "changeOrganizationOwner(bytes32,address)",
    "changeOrganizationName(bytes32,string)",
    "addOrganizationMembers(bytes32,address[])",
    "removeOrganizationMembers(bytes32,address[])",
    "deleteOrganization(bytes32)",
    "listOrganizations()",
    "getOrganizationById(bytes32)",
];

const SERVICES: &[&str] = &[
    "createServiceRegistration(bytes32,bytes32,bytes,bytes32[])",
    "updateServiceRegistration(bytes32,bytes32,bytes)",
    "addTagsToServiceRegistration(bytes32,bytes32,bytes32[])",
    "removeTagsFromServiceRegistration(bytes32,bytes32,bytes32[])",
    "deleteServiceRegistration(bytes32,bytes32)",
    "listServicesForOrganization(bytes32)",
    "getServiceRegistrationById(bytes32,bytes32)",
    "listServiceTags()",
    "listServicesForTag(bytes32)",
];

const TYPE_REPOSITORIES: &[&str] = &[
    "createTypeRepositoryRegistration(bytes32,bytes32,bytes,bytes32[])",
    "updateTypeRepositoryRegistration(bytes32,bytes32,bytes)",
    "addTagsToTypeRepositoryRegistration(bytes32,bytes32,bytes32[])",
    "removeTagsFromTypeRepositoryRegistration(bytes32,bytes32,bytes32[])",
    "deleteTypeRepositoryRegistration(bytes32,bytes32)",
    "listTypeRepositoriesForOrganization(bytes32)",
    "getTypeRepositoryById(bytes32,bytes32)",
    "listTypeRepositoryTags()",
    "listTypeRepositoriesForTag(bytes32)",
];

/// Operation sets a deployment can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    Introspection,
    OrganizationRegistry,
    ServiceRegistry,
    TypeRepositoryRegistry,
    /// Every organization, service and type-repository operation.
    Registry,
}

impl Interface {
    pub const ALL: [Interface; 5] = [
        Interface::Introspection,
        Interface::OrganizationRegistry,
        Interface::ServiceRegistry,
        Interface::TypeRepositoryRegistry,
        Interface::Registry,
    ];

    pub fn signatures(self) -> Vec<&'static str> {
        match self {
            Interface::Introspection => INTROSPECTION.to_vec(),
            Interface::OrganizationRegistry => ORGANIZATIONS.to_vec(),
            Interface::ServiceRegistry => SERVICES.to_vec(),
            Interface::TypeRepositoryRegistry => TYPE_REPOSITORIES.to_vec(),
            Interface::Registry => ORGANIZATIONS
                .iter()
                .chain(SERVICES)
                .chain(TYPE_REPOSITORIES)
                .copied()
                .collect(),
        }
    }

    pub fn id(self) -> InterfaceId {
        xor_selectors(self.signatures())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_id_is_xor_of_component_sets() {
        let mut expected = [0u8; 4];
        for set in [
            Interface::OrganizationRegistry,
            Interface::ServiceRegistry,
            Interface::TypeRepositoryRegistry,
        ] {
            for (acc, b) in expected.iter_mut().zip(set.id().0) {
                *acc ^= b;
            }
        }
        assert_eq!(Interface::Registry.id(), InterfaceId(expected));
    }

    #[test]
    fn ids_are_distinct_and_never_invalid() {
        let ids: std::collections::HashSet<_> = Interface::ALL.iter().map(|i| i.id()).collect();
        assert_eq!(ids.len(), Interface::ALL.len());
        assert!(!ids.contains(&InterfaceId::INVALID));
    }

    #[test]
    fn interface_id_parses_with_or_without_prefix() {
        let id = Interface::Introspection.id();
        assert_eq!(id.to_string().parse::<InterfaceId>().unwrap(), id);
        assert_eq!(hex::encode(id.0).parse::<InterfaceId>().unwrap(), id);
        assert!("0x123".parse::<InterfaceId>().is_err());
    }
}
