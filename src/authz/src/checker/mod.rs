//! In-memory RBAC checker
//!
//! Holds role → permission-set and user → role-set maps and answers
//! "does user U hold permission P?" purely from memory.
//!
//! # Thread Safety
//!
//! Both maps live behind a single `parking_lot::RwLock`. Mutations take the
//! write lock for exactly one critical section, so a concurrent reader sees a
//! mutation either completely or not at all. Checks take the read lock and
//! run concurrently.
//!
//! # Example
//!
//! ```rust
//! use rbac_authz::{Permission, RbacChecker};
//!
//! let checker = RbacChecker::new();
//! checker.grant_permission("editor", Permission::parse("book.*").unwrap());
//! checker.assign_role("u1", "editor");
//!
//! assert!(checker.has_permission("u1", &Permission::parse("book:write").unwrap()));
//! assert!(!checker.has_permission("u1", &Permission::parse("user:read").unwrap()));
//! ```

pub mod snapshot;


pub use snapshot::RbacSnapshot;

use crate::permission::Permission;
use crate::types::{RoleKey, UserId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
struct CheckerState {
    role_permissions: HashMap<RoleKey, HashSet<Permission>>,
    user_roles: HashMap<UserId, HashSet<RoleKey>>,
}

impl CheckerState {
    fn has_permission(&self, user_id: &str, permission: &Permission) -> bool {
        let Some(roles) = self.user_roles.get(user_id) else {
            return false;
        };

        roles.iter().any(|role| {
            self.role_permissions.get(role).is_some_and(|granted| {
                granted.contains(permission)
                    || granted
                        .iter()
                        .any(|g| g.is_wildcard() && g.matches(permission))
            })
        })
    }
}

/// Checker statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckerStats {
    /// Roles with a permission entry
    pub total_roles: usize,
    /// Users with at least one role
    pub total_users: usize,
    /// Grants across all roles
    pub total_permissions: usize,
}

/// Concurrency-safe in-memory RBAC checker
///
/// Unknown roles and users never error; they hold zero permissions.
#[derive(Debug, Default)]
pub struct RbacChecker {
    state: RwLock<CheckerState>,
}

impl RbacChecker {
    /// Create an empty checker
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a checker populated from a snapshot
    pub fn from_snapshot(snapshot: &RbacSnapshot) -> Self {
        let checker = Self::new();
        checker.load_snapshot(snapshot);
        checker
    }

    // ------------------------------------------------------------------
    // Role grants
    // ------------------------------------------------------------------

    /// Grant a permission to a role (idempotent)
    pub fn grant_permission(&self, role: &str, permission: Permission) {
        let mut state = self.state.write();
        state
            .role_permissions
            .entry(role.to_string())
            .or_default()
            .insert(permission);
    }

    /// Grant several permissions to a role in one critical section
    pub fn batch_grant_permissions<I>(&self, role: &str, permissions: I)
    where
        I: IntoIterator<Item = Permission>,
    {
        let mut state = self.state.write();
        state
            .role_permissions
            .entry(role.to_string())
            .or_default()
            .extend(permissions);
    }

    /// Revoke a permission from a role; absent grants are ignored
    pub fn revoke_permission(&self, role: &str, permission: &Permission) {
        let mut state = self.state.write();
        if let Some(granted) = state.role_permissions.get_mut(role) {
            granted.remove(permission);
        }
    }

    /// Replace one role's permission set
    pub fn set_role_permissions<I>(&self, role: &str, permissions: I)
    where
        I: IntoIterator<Item = Permission>,
    {
        let permissions: HashSet<Permission> = permissions.into_iter().collect();
        let mut state = self.state.write();
        state.role_permissions.insert(role.to_string(), permissions);
    }

    /// Drop a role's grants and remove it from every user
    pub fn remove_role(&self, role: &str) {
        let mut state = self.state.write();
        state.role_permissions.remove(role);
        state.user_roles.retain(|_, roles| {
            roles.remove(role);
            !roles.is_empty()
        });
    }

    /// Replace the whole role table
    ///
    /// Roles missing from `roles` lose all grants. User bindings are kept.
    pub fn replace_role_permissions(&self, roles: HashMap<RoleKey, HashSet<Permission>>) {
        let mut state = self.state.write();
        debug!(
            "Replacing role table: {} roles -> {} roles",
            state.role_permissions.len(),
            roles.len()
        );
        state.role_permissions = roles;
    }

    /// Current permission set of a role (empty if unknown)
    pub fn get_role_permissions(&self, role: &str) -> HashSet<Permission> {
        self.state
            .read()
            .role_permissions
            .get(role)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys of every role with a permission entry
    pub fn role_keys(&self) -> Vec<RoleKey> {
        self.state.read().role_permissions.keys().cloned().collect()
    }

    // ------------------------------------------------------------------
    // User bindings
    // ------------------------------------------------------------------

    /// Replace a user's role set; an empty set removes the user
    pub fn set_user_roles<I, S>(&self, user_id: &str, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: HashSet<RoleKey> = roles.into_iter().map(Into::into).collect();
        let mut state = self.state.write();
        if roles.is_empty() {
            state.user_roles.remove(user_id);
        } else {
            state.user_roles.insert(user_id.to_string(), roles);
        }
    }

    /// Add a role to a user (idempotent)
    pub fn assign_role(&self, user_id: &str, role: &str) {
        let mut state = self.state.write();
        state
            .user_roles
            .entry(user_id.to_string())
            .or_default()
            .insert(role.to_string());
    }

    /// Remove a role from a user; absent bindings are ignored
    pub fn revoke_role(&self, user_id: &str, role: &str) {
        let mut state = self.state.write();
        if let Some(roles) = state.user_roles.get_mut(user_id) {
            roles.remove(role);
            if roles.is_empty() {
                state.user_roles.remove(user_id);
            }
        }
    }

    /// Forget a user entirely
    pub fn clear_user(&self, user_id: &str) {
        self.state.write().user_roles.remove(user_id);
    }

    /// Current role set of a user (empty if unknown)
    pub fn get_user_roles(&self, user_id: &str) -> HashSet<RoleKey> {
        self.state
            .read()
            .user_roles
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Identifiers of every user with at least one role
    pub fn user_ids(&self) -> Vec<UserId> {
        self.state.read().user_roles.keys().cloned().collect()
    }

    pub fn has_role(&self, user_id: &str, role: &str) -> bool {
        self.state
            .read()
            .user_roles
            .get(user_id)
            .is_some_and(|roles| roles.contains(role))
    }

    /// True if the user holds at least one of `roles`
    pub fn has_any_role<S: AsRef<str>>(&self, user_id: &str, roles: &[S]) -> bool {
        let state = self.state.read();
        let Some(held) = state.user_roles.get(user_id) else {
            return false;
        };
        roles.iter().any(|role| held.contains(role.as_ref()))
    }

    /// True if the user holds every one of `roles` (false for an empty list)
    pub fn has_all_roles<S: AsRef<str>>(&self, user_id: &str, roles: &[S]) -> bool {
        if roles.is_empty() {
            return false;
        }
        let state = self.state.read();
        let Some(held) = state.user_roles.get(user_id) else {
            return false;
        };
        roles.iter().all(|role| held.contains(role.as_ref()))
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    /// Check whether a user holds a permission through any of their roles
    ///
    /// Exact grants are found by hash lookup; wildcard grants by segment
    /// comparison. Returns on the first match.
    pub fn has_permission(&self, user_id: &str, permission: &Permission) -> bool {
        self.state.read().has_permission(user_id, permission)
    }

    /// Check several permissions against one consistent view of the state
    pub fn batch_check(&self, user_id: &str, permissions: &[Permission]) -> Vec<bool> {
        let state = self.state.read();
        permissions
            .iter()
            .map(|permission| state.has_permission(user_id, permission))
            .collect()
    }

    /// Union of the grants of every role the user holds
    ///
    /// Wildcards are reported as granted, not expanded.
    pub fn user_permissions(&self, user_id: &str) -> BTreeSet<Permission> {
        let state = self.state.read();
        let Some(roles) = state.user_roles.get(user_id) else {
            return BTreeSet::new();
        };

        roles
            .iter()
            .filter_map(|role| state.role_permissions.get(role))
            .flatten()
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    pub fn stats(&self) -> CheckerStats {
        let state = self.state.read();
        CheckerStats {
            total_roles: state.role_permissions.len(),
            total_users: state.user_roles.len(),
            total_permissions: state.role_permissions.values().map(HashSet::len).sum(),
        }
    }

    /// Drop all roles and users
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.role_permissions.clear();
        state.user_roles.clear();
    }

    /// Replace the whole state with a snapshot
    pub fn load_snapshot(&self, snapshot: &RbacSnapshot) {
        let role_permissions = snapshot
            .role_permissions
            .iter()
            .map(|(role, perms)| (role.clone(), perms.iter().cloned().collect()))
            .collect();
        let user_roles = snapshot
            .user_roles
            .iter()
            .filter(|(_, roles)| !roles.is_empty())
            .map(|(user, roles)| (user.clone(), roles.iter().cloned().collect()))
            .collect();

        let mut state = self.state.write();
        state.role_permissions = role_permissions;
        state.user_roles = user_roles;
    }

    /// Export the current state
    pub fn snapshot(&self) -> RbacSnapshot {
        let state = self.state.read();
        RbacSnapshot {
            role_permissions: state
                .role_permissions
                .iter()
                .map(|(role, perms)| (role.clone(), perms.iter().cloned().collect()))
                .collect(),
            user_roles: state
                .user_roles
                .iter()
                .map(|(user, roles)| (user.clone(), roles.iter().cloned().collect()))
                .collect(),
        }
    }
}
