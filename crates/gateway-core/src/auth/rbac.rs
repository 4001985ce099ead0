//! Role/group expansion into a flat permission set (§4.3 step 4).

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::ports::{GroupRepository, RoleRepository};

pub struct PermissionExpander {
    roles: Arc<dyn RoleRepository>,
    groups: Arc<dyn GroupRepository>,
}

impl PermissionExpander {
    pub fn new(roles: Arc<dyn RoleRepository>, groups: Arc<dyn GroupRepository>) -> Self {
        PermissionExpander { roles, groups }
    }

    /// Expands the given roles and groups (a group contributes the roles its
    /// members inherit, which are then expanded the same as directly-held
    /// roles) into the union of permissions they grant.
    pub async fn expand(&self, direct_roles: &[String], group_names: &[String]) -> Result<HashSet<String>, GatewayError> {
        let mut all_roles: HashSet<String> = direct_roles.iter().cloned().collect();

        for group in group_names {
            for role in self.groups.roles_for_group(group).await? {
                all_roles.insert(role);
            }
        }

        let mut permissions = HashSet::new();
        for role in &all_roles {
            for permission in self.roles.permissions_for_role(role).await? {
                permissions.insert(permission);
            }
        }

        Ok(permissions)
    }
}

/// Checks the expanded permission set against an endpoint's required
/// permissions; an empty requirement list is always satisfied.
pub fn has_required_permissions(granted: &HashSet<String>, required: &[String]) -> bool {
    required.iter().all(|perm| granted.contains(perm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_requirement_is_always_satisfied() {
        let granted: HashSet<String> = HashSet::new();
        assert!(has_required_permissions(&granted, &[]));
    }

    #[test]
    fn missing_permission_fails() {
        let granted: HashSet<String> = ["read".to_string()].into_iter().collect();
        assert!(!has_required_permissions(&granted, &["write".to_string()]));
        assert!(has_required_permissions(&granted, &["read".to_string()]));
    }
}
