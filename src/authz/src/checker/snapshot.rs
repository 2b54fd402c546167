//! Serializable checker state
//!
//! Used to seed a checker from a static document (fixtures, warm starts) and
//! to export what a checker currently holds.
//!
//! ```json
//! {
//!   "role_permissions": { "admin": ["*"], "editor": ["document.write"] },
//!   "user_roles": { "user1": ["admin"] }
//! }
//! ```

use crate::error::Result;
use crate::permission::{parse_all, Permission};
use crate::types::{Role, RoleKey, RoleKeyKind, UserId, UserRoleBinding};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Role grants and user bindings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacSnapshot {
    /// Role key → granted permissions
    #[serde(default)]
    pub role_permissions: BTreeMap<RoleKey, BTreeSet<Permission>>,

    /// User → role keys
    #[serde(default)]
    pub user_roles: BTreeMap<UserId, BTreeSet<RoleKey>>,
}

/// Wire form of a snapshot with permissions still unparsed
#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    role_permissions: BTreeMap<RoleKey, Vec<String>>,

    #[serde(default)]
    user_roles: BTreeMap<UserId, BTreeSet<RoleKey>>,
}

impl RbacSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from roles and bindings
    pub fn from_parts(roles: &[Role], bindings: &[UserRoleBinding], kind: RoleKeyKind) -> Self {
        let role_permissions = roles
            .iter()
            .map(|role| (role.key(kind).to_string(), role.permissions.clone()))
            .collect();
        let user_roles = bindings
            .iter()
            .map(|binding| (binding.user_id.clone(), binding.role_keys.clone()))
            .collect();

        Self {
            role_permissions,
            user_roles,
        }
    }

    /// Parse a JSON document
    ///
    /// Permissions are normalized while parsing. A malformed permission is a
    /// validation error; a malformed document is a serialization error.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_str(json)?;

        let mut role_permissions = BTreeMap::new();
        for (role, permissions) in raw.role_permissions {
            role_permissions.insert(role, parse_all(permissions)?.into_iter().collect());
        }

        Ok(Self {
            role_permissions,
            user_roles: raw.user_roles,
        })
    }

    /// Read a JSON document from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the snapshot as JSON to disk
    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snapshot_normalizes_permissions() {
        let snapshot = RbacSnapshot::from_json_str(
            r#"{
                "role_permissions": {
                    "admin": ["*:*", "project.read"],
                    "editor": ["document.write"]
                },
                "user_roles": {"user1": ["admin"], "user2": ["editor"]}
            }"#,
        )
        .unwrap();

        let admin = &snapshot.role_permissions["admin"];
        assert!(admin.contains(&Permission::all()));
        assert!(admin.contains(&Permission::parse("project:read").unwrap()));
        assert!(snapshot.user_roles["user2"].contains("editor"));
    }

    #[test]
    fn test_malformed_permission_is_validation_error() {
        let err = RbacSnapshot::from_json_str(r#"{"role_permissions": {"admin": ["a::b"]}}"#)
            .unwrap_err();
        assert!(err.is_validation(), "unexpected error: {:?}", err);

        let err = RbacSnapshot::from_json_str(
            r#"{"role_permissions": {"admin": ["book.read"], "editor": ["book:"]}}"#,
        )
        .unwrap_err();
        assert!(err.is_validation(), "unexpected error: {:?}", err);
    }

    #[test]
    fn test_malformed_document_is_internal_error() {
        let err = RbacSnapshot::from_json_str(r#"{"role_permissions": ["admin"]}"#).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);

        let err = RbacSnapshot::from_json_str("{").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let snapshot = RbacSnapshot::from_json_str("{}").unwrap();
        assert_eq!(snapshot, RbacSnapshot::new());
    }

    #[test]
    fn test_from_parts() {
        let roles = vec![Role::new("r1", "reader")
            .with_permissions(["book.read"])
            .unwrap()];
        let bindings = vec![UserRoleBinding::new("u1", ["r1"])];

        let snapshot = RbacSnapshot::from_parts(&roles, &bindings, RoleKeyKind::Id);
        assert!(snapshot.role_permissions.contains_key("r1"));
        assert_eq!(snapshot.user_roles["u1"].len(), 1);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rbac.json");

        let mut snapshot = RbacSnapshot::new();
        snapshot
            .role_permissions
            .insert("admin".into(), [Permission::all()].into_iter().collect());
        snapshot.write_json_file(&path).unwrap();

        let loaded = RbacSnapshot::from_json_file(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }
}
