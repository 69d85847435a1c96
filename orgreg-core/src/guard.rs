//! Ownership checks for mutating operations.
//!
//! Authorization is an explicit capability test against the stored
//! organization record; membership never grants anything implicitly beyond
//! what [`authorize_org_member_or_owner`] allows.

use crate::config::PublishPolicy;
use crate::error::RegistryError;
use crate::state::RegistryState;
use crate::types::{Address, EntityKind, OrgId, Organization};

/// Succeeds only for the organization's current owner.
pub fn authorize_org_owner<'a>(
    state: &'a RegistryState,
    caller: &Address,
    org_id: &OrgId,
) -> Result<&'a Organization, RegistryError> {
    let org = lookup(state, org_id)?;
    if org.is_owner(caller) {
        Ok(org)
    } else {
        Err(unauthorized(caller, org_id))
    }
}

/// Succeeds for the owner or any listed member.
pub fn authorize_org_member_or_owner<'a>(
    state: &'a RegistryState,
    caller: &Address,
    org_id: &OrgId,
) -> Result<&'a Organization, RegistryError> {
    let org = lookup(state, org_id)?;
    if org.is_member_or_owner(caller) {
        Ok(org)
    } else {
        Err(unauthorized(caller, org_id))
    }
}

/// Check applied to service and type-repository mutations.
pub fn authorize_publisher<'a>(
    policy: PublishPolicy,
    state: &'a RegistryState,
    caller: &Address,
    org_id: &OrgId,
) -> Result<&'a Organization, RegistryError> {
    match policy {
        PublishPolicy::Owner => authorize_org_owner(state, caller, org_id),
        PublishPolicy::OwnerOrMember => authorize_org_member_or_owner(state, caller, org_id),
    }
}

fn lookup<'a>(state: &'a RegistryState, org_id: &OrgId) -> Result<&'a Organization, RegistryError> {
    state
        .organizations
        .get(org_id)
        .ok_or_else(|| RegistryError::not_found(EntityKind::Organization, org_id))
}

fn unauthorized(caller: &Address, org_id: &OrgId) -> RegistryError {
    RegistryError::Unauthorized {
        caller: *caller,
        org: *org_id,
    }
}
