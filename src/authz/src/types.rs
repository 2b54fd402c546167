//! Core RBAC types

use crate::error::Result;
use crate::permission::Permission;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique role identifier
pub type RoleId = String;

/// Key a role is stored under in the checker (its id or its name)
pub type RoleKey = String;

/// Unique user identifier
pub type UserId = String;

/// Which role field the checker is keyed by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKeyKind {
    /// Key by role name (e.g. "admin")
    #[default]
    Name,
    /// Key by role identifier (e.g. "role_admin")
    Id,
}

impl std::str::FromStr for RoleKeyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "id" => Ok(Self::Id),
            other => Err(format!("unknown role key kind '{}'", other)),
        }
    }
}

/// Named bundle of permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier
    pub id: RoleId,

    /// Role name
    pub name: String,

    /// Human readable description
    #[serde(default)]
    pub description: String,

    /// System roles are seeded by the platform and cannot be deleted
    #[serde(default)]
    pub is_system: bool,

    /// Granted permissions and wildcards (duplicates collapse)
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl Role {
    /// Create a role without permissions
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            is_system: false,
            permissions: BTreeSet::new(),
        }
    }

    /// Add permission strings, normalizing delimiters
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for permission in permissions {
            self.permissions.insert(Permission::parse(permission.as_ref())?);
        }
        Ok(self)
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark as a system role
    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Key this role is stored under in the checker
    pub fn key(&self, kind: RoleKeyKind) -> &str {
        match kind {
            RoleKeyKind::Name => &self.name,
            RoleKeyKind::Id => &self.id,
        }
    }
}

/// Association of a user to role keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleBinding {
    /// User identifier
    pub user_id: UserId,

    /// Bound role keys
    #[serde(default)]
    pub role_keys: BTreeSet<RoleKey>,
}

impl UserRoleBinding {
    pub fn new<I, S>(user_id: impl Into<String>, role_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            role_keys: role_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a binding from resolved roles
    pub fn from_roles(user_id: impl Into<String>, roles: &[Role], kind: RoleKeyKind) -> Self {
        Self::new(user_id, roles.iter().map(|role| role.key(kind).to_string()))
    }

    /// A user without bindings holds no permissions
    pub fn is_empty(&self) -> bool {
        self.role_keys.is_empty()
    }
}
