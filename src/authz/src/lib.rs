//! # RBAC Authorization Engine
//!
//! Role-based access control with an in-memory, concurrency-safe checker.
//!
//! ## Features
//!
//! - **Permission grammar** `resource:action[:id]` with `.` accepted as an
//!   alternate delimiter
//! - **Wildcards**: universal `*` and resource-scoped `resource:*`
//! - **Fail-closed** checks: unknown users and roles hold nothing
//! - **Async loading** from a pluggable [`AuthRepository`], with
//!   cancellation and periodic reload
//! - **Lock-light hot path**: checks never touch the repository
//!
//! ## Example
//!
//! ```rust
//! use rbac_authz::{InMemoryAuthRepository, PermissionService, RbacChecker, Role};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repository = Arc::new(InMemoryAuthRepository::new());
//!     repository
//!         .create_role(Role::new("role_reader", "reader").with_permissions(["book.read"])?)
//!         .await?;
//!     repository.assign_user_role("alice", "role_reader").await?;
//!
//!     let service = PermissionService::new(repository);
//!     service.set_checker(Arc::new(RbacChecker::new()));
//!     service.load_permissions_to_checker().await?;
//!     service.load_user_roles_to_checker("alice").await?;
//!
//!     assert!(service.check_permission("alice", "book:read").await?);
//!     assert!(!service.check_permission("alice", "book:delete").await?);
//!
//!     Ok(())
//! }
//! ```

pub mod checker;
pub mod error;
pub mod permission;
pub mod repository;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use checker::{CheckerStats, RbacChecker, RbacSnapshot};
pub use error::{AuthzError, ErrorKind, Result};
pub use permission::Permission;
pub use repository::{AuthRepository, InMemoryAuthRepository};
pub use service::{MetricsCollector, PermissionService, PermissionServiceConfig, ServiceMetrics};
pub use types::{Role, RoleId, RoleKey, RoleKeyKind, UserId, UserRoleBinding};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
