use std::collections::BTreeSet;

use crate::{Permission, RequestMeta, Role};

/// Trusted identity of the caller of one request.
///
/// Built fresh per request from transport metadata, read-only for the
/// lifetime of one operation and passed explicitly into each call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityContext {
    caller_id: Option<i64>,
    roles: BTreeSet<Role>,
    permissions: BTreeSet<Permission>,
}

impl IdentityContext {
    pub fn new(caller_id: Option<i64>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            caller_id,
            roles: roles.into_iter().collect(),
            permissions: BTreeSet::new(),
        }
    }

    /// Identity with no caller and no roles.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    pub fn caller_id(&self) -> Option<i64> {
        self.caller_id
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

impl From<&RequestMeta> for IdentityContext {
    fn from(meta: &RequestMeta) -> Self {
        let Some(user) = meta.user.as_ref() else {
            return Self::anonymous();
        };

        let roles = user.roles.iter().filter_map(|raw| match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(err) => {
                tracing::debug!(request_id = %meta.id, %err, "dropping unrecognised role");
                None
            }
        });

        Self::new(user.id, roles).with_permissions(
            user.permissions
                .iter()
                .map(|p| Permission::new(p.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_identity_from_metadata() {
        let meta = RequestMeta::new("r-1").with_user(5, &["USER", "ADMIN"]);
        let identity = IdentityContext::from(&meta);

        assert_eq!(identity.caller_id(), Some(5));
        assert!(identity.has_role(Role::User));
        assert!(identity.has_role(Role::Admin));
    }

    #[test]
    fn unknown_roles_are_dropped() {
        let meta = RequestMeta::new("r-2").with_user(5, &["user", "ROOT", "USER"]);
        let identity = IdentityContext::from(&meta);

        assert_eq!(identity.roles().len(), 1);
        assert!(identity.has_role(Role::User));
    }

    #[test]
    fn missing_user_section_is_anonymous() {
        let identity = IdentityContext::from(&RequestMeta::new("r-3"));
        assert_eq!(identity, IdentityContext::anonymous());
    }

    #[test]
    fn permissions_are_carried() {
        let mut meta = RequestMeta::new("r-4").with_user(1, &["USER"]);
        if let Some(user) = meta.user.as_mut() {
            user.permissions = vec!["user.read".to_string()];
        }
        let identity = IdentityContext::from(&meta);
        assert!(identity.permissions().contains(&Permission::new("user.read")));
    }
}
