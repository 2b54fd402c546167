//! Auth repository interface and in-memory implementation
//!
//! The permission service pulls roles and user bindings through
//! [`AuthRepository`]. Production deployments implement it over their
//! database; [`InMemoryAuthRepository`] backs tests and embedded use.

use crate::error::{AuthzError, Result};
use crate::permission::Permission;
use crate::types::{Role, RoleId, UserId};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistent store of roles and user-role bindings
#[async_trait]
pub trait AuthRepository: Send + Sync {
    /// List all roles
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Roles bound to a user, resolved (not raw ids)
    async fn get_user_roles(&self, user_id: &str) -> Result<Vec<Role>>;

    /// Connectivity check
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    roles: HashMap<RoleId, Role>,
    user_roles: HashMap<UserId, Vec<RoleId>>,
}

/// In-memory auth repository implementation
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemoryAuthRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a role, generating an id when it has none; returns the id
    pub async fn create_role(&self, mut role: Role) -> Result<RoleId> {
        if role.id.is_empty() {
            role.id = Uuid::new_v4().to_string();
        }
        if role.name.is_empty() {
            return Err(AuthzError::InvalidInput("role name cannot be empty".to_string()));
        }

        let id = role.id.clone();
        self.state.write().await.roles.insert(id.clone(), role);
        Ok(id)
    }

    /// Replace a role's permissions
    pub async fn update_role_permissions(
        &self,
        role_id: &str,
        permissions: BTreeSet<Permission>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let role = state
            .roles
            .get_mut(role_id)
            .ok_or_else(|| AuthzError::RoleNotFound(role_id.to_string()))?;
        role.permissions = permissions;
        Ok(())
    }

    /// Add one permission to a role
    pub async fn assign_permission_to_role(
        &self,
        role_id: &str,
        permission: Permission,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let role = state
            .roles
            .get_mut(role_id)
            .ok_or_else(|| AuthzError::RoleNotFound(role_id.to_string()))?;
        role.permissions.insert(permission);
        Ok(())
    }

    /// Remove one permission from a role
    pub async fn remove_permission_from_role(
        &self,
        role_id: &str,
        permission: &Permission,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let role = state
            .roles
            .get_mut(role_id)
            .ok_or_else(|| AuthzError::RoleNotFound(role_id.to_string()))?;
        role.permissions.remove(permission);
        Ok(())
    }

    /// Get a role by id
    pub async fn get_role(&self, role_id: &str) -> Result<Option<Role>> {
        Ok(self.state.read().await.roles.get(role_id).cloned())
    }

    /// Delete a role and its bindings; system roles are refused
    pub async fn delete_role(&self, role_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        match state.roles.get(role_id) {
            Some(role) if role.is_system => {
                return Err(AuthzError::SystemRole(role.name.clone()));
            }
            Some(_) => {}
            None => return Err(AuthzError::RoleNotFound(role_id.to_string())),
        }

        state.roles.remove(role_id);
        for bound in state.user_roles.values_mut() {
            bound.retain(|id| id != role_id);
        }
        Ok(())
    }

    /// Bind a role to a user (idempotent)
    pub async fn assign_user_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(role_id) {
            return Err(AuthzError::RoleNotFound(role_id.to_string()));
        }

        let bound = state.user_roles.entry(user_id.to_string()).or_default();
        if !bound.iter().any(|id| id == role_id) {
            bound.push(role_id.to_string());
        }
        Ok(())
    }

    /// Unbind a role from a user
    pub async fn remove_user_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(bound) = state.user_roles.get_mut(user_id) {
            bound.retain(|id| id != role_id);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthRepository for InMemoryAuthRepository {
    async fn list_roles(&self) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().cloned().collect())
    }

    async fn get_user_roles(&self, user_id: &str) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        let Some(bound) = state.user_roles.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(bound
            .iter()
            .filter_map(|id| state.roles.get(id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(list: &[&str]) -> BTreeSet<Permission> {
        list.iter().map(|p| Permission::parse(p).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_create_and_list_roles() {
        let repo = InMemoryAuthRepository::new();

        let role = Role::new("", "editor")
            .with_permissions(["user.read", "user.write"])
            .unwrap();
        let id = repo.create_role(role).await.unwrap();
        assert!(!id.is_empty(), "Role ID should be generated");

        let roles = repo.list_roles().await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, id);
    }

    #[tokio::test]
    async fn test_user_roles_are_resolved() {
        let repo = InMemoryAuthRepository::new();
        repo.create_role(Role::new("role_author", "author")).await.unwrap();
        repo.assign_user_role("u1", "role_author").await.unwrap();
        repo.assign_user_role("u1", "role_author").await.unwrap();

        let roles = repo.get_user_roles("u1").await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "author");

        assert!(repo.get_user_roles("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assign_unknown_role_fails() {
        let repo = InMemoryAuthRepository::new();
        let err = repo.assign_user_role("u1", "missing").await.unwrap_err();
        assert!(matches!(err, AuthzError::RoleNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_role_permissions() {
        let repo = InMemoryAuthRepository::new();
        repo.create_role(Role::new("r1", "admin")).await.unwrap();

        repo.assign_permission_to_role("r1", Permission::parse("user.delete").unwrap())
            .await
            .unwrap();
        let role = repo.get_role("r1").await.unwrap().unwrap();
        assert_eq!(role.permissions.len(), 1);

        repo.update_role_permissions("r1", perms(&["book.read", "book.write"]))
            .await
            .unwrap();
        repo.remove_permission_from_role("r1", &Permission::parse("book:write").unwrap())
            .await
            .unwrap();
        let role = repo.get_role("r1").await.unwrap().unwrap();
        assert_eq!(role.permissions, perms(&["book:read"]));
    }

    #[tokio::test]
    async fn test_delete_system_role_refused() {
        let repo = InMemoryAuthRepository::new();
        repo.create_role(Role::new("r_super", "super_admin").system())
            .await
            .unwrap();
        repo.create_role(Role::new("r_custom", "custom_role")).await.unwrap();
        repo.assign_user_role("u1", "r_custom").await.unwrap();

        let err = repo.delete_role("r_super").await.unwrap_err();
        assert!(matches!(err, AuthzError::SystemRole(_)));

        repo.delete_role("r_custom").await.unwrap();
        assert!(repo.get_user_roles("u1").await.unwrap().is_empty());
    }
}
