//! Domain types for the registry.
//!
//! Every identifier is a fixed 32-byte key ([`Id`]). Keys can be written as
//! `0x` followed by 64 hex digits, or as a short UTF-8 label that is
//! right-padded with zero bytes. The all-zero key is reserved and never names
//! an entity.
//!
//! All types serialize to JSON/YAML strings so that ledger lines and protocol
//! messages stay human readable.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RegistryError;

pub const ID_LEN: usize = 32;
pub const ADDRESS_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Raw keys
// ---------------------------------------------------------------------------

/// Opaque 32-byte key shared by organizations, services, repositories and tags.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Id(pub [u8; ID_LEN]);

impl Id {
    pub const ZERO: Id = Id([0; ID_LEN]);
    pub const MAX: Id = Id([0xff; ID_LEN]);

    /// Build a key from a text label (1..=32 bytes, zero padded).
    pub fn from_label(label: &str) -> Result<Self, RegistryError> {
        let bytes = label.as_bytes();
        if bytes.is_empty() || bytes.len() > ID_LEN {
            return Err(RegistryError::InvalidArgument(format!(
                "label '{label}' must be 1 to {ID_LEN} bytes"
            )));
        }
        let mut out = [0u8; ID_LEN];
        out[..bytes.len()].copy_from_slice(bytes);
        let id = Self(out);
        if id.is_zero() {
            return Err(RegistryError::InvalidArgument(
                "the all-zero id is reserved".to_string(),
            ));
        }
        Ok(id)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// The text label, if this key is zero-padded printable UTF-8.
    pub fn label(&self) -> Option<&str> {
        let end = self.0.iter().rposition(|b| *b != 0)? + 1;
        let text = std::str::from_utf8(&self.0[..end]).ok()?;
        if text.starts_with("0x") || text.chars().any(char::is_control) {
            return None;
        }
        Some(text)
    }
}

impl FromStr for Id {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(digits) = s.strip_prefix("0x").filter(|d| d.len() == ID_LEN * 2) else {
            return Self::from_label(s);
        };
        let mut out = [0u8; ID_LEN];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|e| RegistryError::InvalidArgument(format!("malformed id '{s}': {e}")))?;
        let id = Self(out);
        if id.is_zero() {
            return Err(RegistryError::InvalidArgument(
                "the all-zero id is reserved".to_string(),
            ));
        }
        Ok(id)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => f.write_str(&self.to_hex()),
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Lower and upper bounds of a key type, used for composite-key range scans.
pub trait KeyBounds: Sized {
    const MIN: Self;
    const MAX: Self;
}

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Id);

        impl $name {
            pub fn from_label(label: &str) -> Result<Self, RegistryError> {
                Id::from_label(label).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl FromStr for $name {
            type Err = RegistryError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<Id> for $name {
            fn from(id: Id) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Id {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl KeyBounds for $name {
            const MIN: Self = Self(Id::ZERO);
            const MAX: Self = Self(Id::MAX);
        }
    };
}

id_newtype!(
    /// Organization identifier, unique across the registry.
    OrgId
);
id_newtype!(
    /// Service identifier, unique within its organization.
    ServiceId
);
id_newtype!(
    /// Type-repository identifier, unique within its organization.
    RepositoryId
);
id_newtype!(
    /// Discovery tag.
    Tag
);

/// A 20-byte account address. Ownership checks compare addresses only.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0; ADDRESS_LEN]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl FromStr for Address {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .filter(|d| d.len() == ADDRESS_LEN * 2)
            .ok_or_else(|| {
                RegistryError::InvalidArgument(format!(
                    "address '{s}' must be 0x followed by {} hex digits",
                    ADDRESS_LEN * 2
                ))
            })?;
        let mut out = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|e| RegistryError::InvalidArgument(format!("malformed address '{s}': {e}")))?;
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque byte reference (metadata URI, repository URI).
///
/// Serialized as `0x`-prefixed hex; displayed as text when it is valid UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Blob {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Blob {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => f.write_str(text),
            Err(_) => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({self})")
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| serde::de::Error::custom("blob must be 0x-prefixed hex"))?;
        hex::decode(digits).map(Self).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// Which collection an entity lives in. Used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organization,
    Service,
    TypeRepository,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Organization => write!(f, "organization"),
            EntityKind::Service => write!(f, "service"),
            EntityKind::TypeRepository => write!(f, "type repository"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Top-level tenant owning services and type repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub owner: Address,
    #[serde(default)]
    pub members: BTreeSet<Address>,
    #[serde(default)]
    pub service_ids: BTreeSet<ServiceId>,
    #[serde(default)]
    pub repository_ids: BTreeSet<RepositoryId>,
}

impl Organization {
    pub fn is_owner(&self, who: &Address) -> bool {
        self.owner == *who
    }

    /// Members include the owner for authorization purposes.
    pub fn is_member_or_owner(&self, who: &Address) -> bool {
        self.is_owner(who) || self.members.contains(who)
    }
}

/// A published service: metadata reference plus discovery tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub org_id: OrgId,
    pub id: ServiceId,
    pub metadata_uri: Blob,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
}

/// A published type-definition bundle: repository reference plus tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRepositoryRegistration {
    pub org_id: OrgId,
    pub id: RepositoryId,
    pub repository_uri: Blob,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
}

/// Result of a tag lookup, as two parallel lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMatches<E> {
    pub org_ids: Vec<OrgId>,
    pub entity_ids: Vec<E>,
}

impl<E> TagMatches<E> {
    pub fn is_empty(&self) -> bool {
        self.org_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.org_ids.len()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&OrgId, &E)> {
        self.org_ids.iter().zip(self.entity_ids.iter())
    }
}

impl<E> Default for TagMatches<E> {
    fn default() -> Self {
        Self {
            org_ids: Vec::new(),
            entity_ids: Vec::new(),
        }
    }
}

impl<E> FromIterator<(OrgId, E)> for TagMatches<E> {
    fn from_iter<I: IntoIterator<Item = (OrgId, E)>>(iter: I) -> Self {
        let (org_ids, entity_ids) = iter.into_iter().unzip();
        Self {
            org_ids,
            entity_ids,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
