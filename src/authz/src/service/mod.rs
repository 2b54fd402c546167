//! Permission service
//!
//! Bridges an [`AuthRepository`] and an injected [`RbacChecker`]: pulls roles
//! and user bindings from the repository into the checker and answers
//! permission queries from memory.
//!
//! # Architecture
//!
//! ```text
//! Repository ──(I/O, no lock)──→ role table ──(one write section)──→ Checker
//!                                                                      ↓
//! check_permission ──→ configured? ──→ validate ──→ has_permission ──→ bool
//!                                                                      ↓
//!                                                           [Metrics, atomic]
//! ```
//!
//! Repository I/O races the service's cancellation token; applying the
//! fetched data to the checker is synchronous and never cancelled halfway.

pub mod config;
pub mod metrics;

pub use config::PermissionServiceConfig;
pub use metrics::{MetricsCollector, ServiceMetrics};

use crate::checker::RbacChecker;
use crate::error::{AuthzError, ErrorKind, Result};
use crate::permission::{parse_all, Permission};
use crate::repository::AuthRepository;
use crate::types::{RoleKey, UserId};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Loads RBAC data into a checker and answers permission queries
pub struct PermissionService {
    /// Role and binding source
    repository: Arc<dyn AuthRepository>,

    /// Injected checker; unset until `set_checker`
    checker: RwLock<Option<Arc<RbacChecker>>>,

    /// Service configuration
    config: PermissionServiceConfig,

    /// Metrics collector
    metrics: Option<Arc<MetricsCollector>>,

    /// Cancels repository I/O and the reload task
    cancel: CancellationToken,
}

impl PermissionService {
    /// Create a service with the default configuration
    pub fn new(repository: Arc<dyn AuthRepository>) -> Self {
        Self::build(repository, PermissionServiceConfig::default())
    }

    /// Create a service with an explicit configuration
    pub fn with_config(
        repository: Arc<dyn AuthRepository>,
        config: PermissionServiceConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(repository, config))
    }

    fn build(repository: Arc<dyn AuthRepository>, config: PermissionServiceConfig) -> Self {
        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        info!(
            "PermissionService initialized with role_key={:?}, reload_interval={:?}, metrics={}",
            config.role_key, config.reload_interval_secs, config.enable_metrics
        );

        Self {
            repository,
            checker: RwLock::new(None),
            config,
            metrics,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &PermissionServiceConfig {
        &self.config
    }

    /// Attach the checker; replaces any previously attached one
    pub fn set_checker(&self, checker: Arc<RbacChecker>) {
        *self.checker.write() = Some(checker);
        debug!("Checker attached to permission service");
    }

    /// The attached checker, or a configuration error
    pub fn checker(&self) -> Result<Arc<RbacChecker>> {
        self.checker
            .read()
            .clone()
            .ok_or(AuthzError::CheckerNotConfigured)
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Replace the checker's role table with the repository's roles
    ///
    /// Grants removed in the repository and roles that no longer exist are
    /// dropped. User bindings are kept. Returns the number of roles applied.
    pub async fn load_permissions_to_checker(&self) -> Result<usize> {
        let checker = self.checker()?;
        let roles = self
            .fetch("failed to list roles", self.repository.list_roles())
            .await?;

        let kind = self.config.role_key;
        let mut table: HashMap<RoleKey, HashSet<Permission>> =
            HashMap::with_capacity(roles.len());
        for role in roles {
            let key = role.key(kind).to_string();
            if key.is_empty() {
                warn!(
                    "Skipping role without a {:?} key (id={}, name={})",
                    kind, role.id, role.name
                );
                continue;
            }
            table.entry(key).or_default().extend(role.permissions);
        }

        let count = table.len();
        checker.replace_role_permissions(table);

        info!("Loaded {} roles into checker", count);
        Ok(count)
    }

    /// Replace one user's bindings with the roles the repository reports
    ///
    /// A user without roles is removed from the checker.
    pub async fn load_user_roles_to_checker(&self, user_id: &str) -> Result<()> {
        let checker = self.checker()?;
        if user_id.trim().is_empty() {
            return Err(AuthzError::InvalidInput("user id cannot be empty".to_string()));
        }

        let roles = self
            .fetch(
                format!("failed to get roles of user {}", user_id),
                self.repository.get_user_roles(user_id),
            )
            .await?;

        let kind = self.config.role_key;
        let keys: Vec<RoleKey> = roles
            .iter()
            .map(|role| role.key(kind))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect();

        debug!("Loaded {} roles for user {}", keys.len(), user_id);
        checker.set_user_roles(user_id, keys);
        Ok(())
    }

    /// Load bindings for many users with bounded concurrency
    ///
    /// Every user is attempted; the first failure is returned after the rest
    /// complete. Returns the number of users loaded.
    pub async fn load_users_to_checker<I, S>(&self, users: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<UserId>,
    {
        self.checker()?;
        let users: Vec<UserId> = users.into_iter().map(Into::into).collect();
        let total = users.len();

        let this = self;
        let mut loads = stream::iter(users)
            .map(move |user| async move {
                let result = this.load_user_roles_to_checker(&user).await;
                (user, result)
            })
            .buffer_unordered(self.config.user_load_concurrency);

        let mut loaded = 0;
        let mut first_error = None;
        while let Some((user, result)) = loads.next().await {
            match result {
                Ok(()) => loaded += 1,
                Err(e) => {
                    warn!("Failed to load roles for user {}: {}", user, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        info!("Loaded roles for {}/{} users", loaded, total);
        match first_error {
            Some(e) => Err(e),
            None => Ok(loaded),
        }
    }

    /// Reload every role permission set from the repository
    ///
    /// With `reload_known_users`, bindings of users already present in the
    /// checker are refreshed as well.
    pub async fn reload_all_from_database(&self) -> Result<()> {
        let start = Instant::now();
        let result = self.reload().await;

        match &result {
            Ok(roles) => {
                info!("Reloaded {} roles in {:?}", roles, start.elapsed());
                if let Some(metrics) = &self.metrics {
                    metrics.record_reload(*roles, start.elapsed()).await;
                }
            }
            Err(e) => {
                warn!("Reload from repository failed: {}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_reload_failure().await;
                }
            }
        }

        result.map(|_| ())
    }

    async fn reload(&self) -> Result<usize> {
        let roles = self.load_permissions_to_checker().await?;

        if self.config.reload_known_users {
            let users = self.checker()?.user_ids();
            self.load_users_to_checker(users).await?;
        }

        Ok(roles)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Check whether a user holds a permission
    ///
    /// Denial is `Ok(false)`. Errors only when no checker is attached or the
    /// permission string is malformed.
    pub async fn check_permission(&self, user_id: &str, permission: &str) -> Result<bool> {
        let checker = self.checker()?;
        let permission = match Permission::parse(permission) {
            Ok(permission) => permission,
            Err(e) => {
                self.record_validation_error();
                return Err(e);
            }
        };

        let allowed = checker.has_permission(user_id, &permission);
        debug!(
            "Permission check: user={}, permission={}, allowed={}",
            user_id, permission, allowed
        );

        self.record_check(allowed);
        Ok(allowed)
    }

    /// True if the user holds at least one of `permissions` (false if empty)
    ///
    /// Counted as one check in the metrics.
    pub async fn check_any_permission<S: AsRef<str>>(
        &self,
        user_id: &str,
        permissions: &[S],
    ) -> Result<bool> {
        let checker = self.checker()?;
        let permissions = self.parse_batch(permissions)?;
        let allowed = checker
            .batch_check(user_id, &permissions)
            .into_iter()
            .any(|allowed| allowed);

        self.record_check(allowed);
        Ok(allowed)
    }

    /// True if the user holds every one of `permissions` (false if empty)
    ///
    /// Counted as one check in the metrics.
    pub async fn check_all_permissions<S: AsRef<str>>(
        &self,
        user_id: &str,
        permissions: &[S],
    ) -> Result<bool> {
        let checker = self.checker()?;
        let permissions = self.parse_batch(permissions)?;
        let allowed = !permissions.is_empty()
            && checker
                .batch_check(user_id, &permissions)
                .into_iter()
                .all(|allowed| allowed);

        self.record_check(allowed);
        Ok(allowed)
    }

    fn parse_batch<S: AsRef<str>>(&self, permissions: &[S]) -> Result<Vec<Permission>> {
        parse_all(permissions).inspect_err(|_| self.record_validation_error())
    }

    fn record_check(&self, allowed: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_check(allowed);
        }
    }

    fn record_validation_error(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_validation_error();
        }
    }

    /// Sorted union of the user's grants; wildcards are reported as granted
    pub async fn get_user_permissions(&self, user_id: &str) -> Result<Vec<Permission>> {
        let checker = self.checker()?;
        Ok(checker.user_permissions(user_id).into_iter().collect())
    }

    /// Sorted role keys bound to the user
    pub async fn get_user_roles(&self, user_id: &str) -> Result<Vec<RoleKey>> {
        let checker = self.checker()?;
        let mut roles: Vec<RoleKey> = checker.get_user_roles(user_id).into_iter().collect();
        roles.sort();
        Ok(roles)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Checker attached and repository reachable
    pub async fn health_check(&self) -> Result<()> {
        self.checker()?;
        self.fetch("repository health check failed", self.repository.health())
            .await
    }

    /// Spawn the periodic reload task if an interval is configured
    ///
    /// The first reload runs one interval after spawning. The task holds only
    /// a weak reference: it stops on [`shutdown`](Self::shutdown) or once the
    /// last `Arc` to the service is dropped.
    pub fn spawn_reload_task(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.config.reload_interval()?;
        let cancel = self.cancel.clone();
        let service = Arc::downgrade(&self);
        drop(self);

        info!("Starting periodic reload every {:?}", period);
        Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(service) = service.upgrade() else {
                            break;
                        };
                        // Failures are logged and counted; the next tick retries
                        let _ = service.reload_all_from_database().await;
                    }
                }
            }

            info!("Periodic reload stopped");
        }))
    }

    /// Cancel in-flight repository I/O and stop the reload task
    ///
    /// Subsequent loads fail with [`AuthzError::Cancelled`]; checks keep
    /// answering from the checker.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Shutting down permission service");
            self.cancel.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Get service metrics
    pub async fn metrics(&self) -> Option<ServiceMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.get_metrics().await),
            None => None,
        }
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self) -> Option<String> {
        match &self.metrics {
            Some(metrics) => Some(metrics.export_prometheus().await),
            None => None,
        }
    }

    /// Run repository I/O, racing the cancellation token
    async fn fetch<T, F>(&self, context: impl Into<String>, io: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Repository call cancelled");
                Err(AuthzError::Cancelled)
            }
            result = io => result.map_err(|e| match e.kind() {
                ErrorKind::Repository | ErrorKind::Cancelled => e,
                _ => AuthzError::repository(context, e),
            }),
        }
    }
}

impl std::fmt::Debug for PermissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionService")
            .field("config", &self.config)
            .field("checker_configured", &self.checker.read().is_some())
            .field("shutdown", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryAuthRepository;

    #[tokio::test]
    async fn test_service_creation() {
        let service = PermissionService::new(Arc::new(InMemoryAuthRepository::new()));
        assert!(service.metrics.is_some());
        assert!(service.checker().unwrap_err().is_configuration());
        assert!(!service.is_shutdown());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = PermissionServiceConfig {
            user_load_concurrency: 0,
            ..Default::default()
        };
        let repo = Arc::new(InMemoryAuthRepository::new());
        let result = PermissionService::with_config(repo, config);
        assert!(result.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let config = PermissionServiceConfig {
            enable_metrics: false,
            ..Default::default()
        };
        let repo = Arc::new(InMemoryAuthRepository::new());
        let service = PermissionService::with_config(repo, config).unwrap();
        assert!(service.metrics().await.is_none());
        assert!(service.export_prometheus().await.is_none());
    }

    #[tokio::test]
    async fn test_spawn_without_interval() {
        let service = Arc::new(PermissionService::new(Arc::new(InMemoryAuthRepository::new())));
        assert!(service.spawn_reload_task().is_none());
    }

    #[tokio::test]
    async fn test_fetch_wraps_foreign_errors() {
        let service = PermissionService::new(Arc::new(InMemoryAuthRepository::new()));
        let result: Result<()> = service
            .fetch("listing", async { Err(AuthzError::Internal("boom".into())) })
            .await;
        let err = result.unwrap_err();
        assert!(err.is_repository());
        assert!(err.to_string().contains("listing"));
    }
}
