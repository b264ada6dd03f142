//! Access-control gate.
//!
//! Rules are hard-coded per operation and evaluated in order:
//!
//! 1. The caller must be a user: `caller_id >= 1` and the `USER` role.
//! 2. Targeted operations additionally require ownership of the target or
//!    the `ADMIN` role.
//! 3. Listing returns everything for admins and only the caller's own record
//!    for everybody else.
//!
//! - No IO
//! - No panics
//! - `permissions` on the identity are not consulted

use thiserror::Error;

use userhub_core::{DomainError, UserId};

use crate::{IdentityContext, Role};

/// Why the gate said no.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// No caller id, or a caller id below 1.
    NoCaller,
    /// Caller id present but the `USER` role is missing.
    MissingUserRole,
    /// Caller is a user but neither owns the target nor is an admin.
    NotOwner,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialReason::NoCaller => "no_caller",
            DenialReason::MissingUserRole => "missing_user_role",
            DenialReason::NotOwner => "not_owner",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("missing permission ({})", .0.as_str())]
    MissingPermission(DenialReason),
}

impl AuthzError {
    pub fn reason(&self) -> DenialReason {
        match self {
            AuthzError::MissingPermission(reason) => *reason,
        }
    }
}

impl From<AuthzError> for DomainError {
    fn from(_: AuthzError) -> Self {
        DomainError::MissingPermission
    }
}

/// Grounds on which access to a specific record was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Owner,
    Admin,
}

/// What a listing request may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    All,
    Own(UserId),
}

/// Rule 1: the caller is an authenticated user.
///
/// Returns the caller's id on success.
pub fn authorize_caller(identity: &IdentityContext) -> Result<UserId, AuthzError> {
    let caller = identity
        .caller_id()
        .and_then(|id| UserId::new(id).ok())
        .ok_or(AuthzError::MissingPermission(DenialReason::NoCaller))?;

    if !identity.has_role(Role::User) {
        return Err(AuthzError::MissingPermission(DenialReason::MissingUserRole));
    }

    Ok(caller)
}

/// Rule 2: the caller owns `owner`'s record, or is an admin.
///
/// Ownership takes precedence when both hold.
pub fn authorize_target(identity: &IdentityContext, owner: UserId) -> Result<Access, AuthzError> {
    let caller = authorize_caller(identity)?;

    if caller == owner {
        Ok(Access::Owner)
    } else if identity.has_role(Role::Admin) {
        Ok(Access::Admin)
    } else {
        Err(AuthzError::MissingPermission(DenialReason::NotOwner))
    }
}

/// Rule 3: scope of a listing request.
pub fn list_scope(identity: &IdentityContext) -> Result<ListScope, AuthzError> {
    let caller = authorize_caller(identity)?;

    if identity.has_role(Role::Admin) {
        Ok(ListScope::All)
    } else {
        Ok(ListScope::Own(caller))
    }
}
