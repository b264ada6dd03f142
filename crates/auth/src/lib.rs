//! `userhub-auth` — caller identity and the access-control gate.
//!
//! This crate is intentionally decoupled from the message bus and storage:
//! it turns trusted request metadata into an [`IdentityContext`] and answers
//! allow/deny questions about it.

pub mod authorize;
pub mod identity;
pub mod meta;
pub mod permissions;
pub mod roles;

pub use authorize::{
    Access, AuthzError, DenialReason, ListScope, authorize_caller, authorize_target, list_scope,
};
pub use identity::IdentityContext;
pub use meta::{RequestMeta, RequestUser};
pub use permissions::Permission;
pub use roles::Role;
