//! Prometheus metrics collection for permission service observability

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Permission service metrics
#[derive(Debug, Clone, Default)]
pub struct ServiceMetrics {
    /// Total number of permission checks
    pub total_checks: u64,

    /// Checks that returned true
    pub allowed_checks: u64,

    /// Checks that returned false
    pub denied_checks: u64,

    /// Checks rejected because the permission string was malformed
    pub validation_errors: u64,

    /// Completed reloads from the repository
    pub reloads: u64,

    /// Failed or cancelled reloads
    pub reload_failures: u64,

    /// Roles applied by the last successful reload
    pub last_reload_roles: u64,

    /// Reload latency percentiles (p50, p90, p95, p99, p99.9)
    pub reload_p50_ms: f64,
    pub reload_p90_ms: f64,
    pub reload_p95_ms: f64,
    pub reload_p99_ms: f64,
    pub reload_p999_ms: f64,

    /// Average reload latency
    pub avg_reload_ms: f64,
}

impl ServiceMetrics {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_checks + self.denied_checks;
        if total == 0 {
            0.0
        } else {
            self.allowed_checks as f64 / total as f64
        }
    }
}

/// Reload counters and latency samples
#[derive(Debug, Default)]
struct ReloadState {
    reloads: u64,
    reload_failures: u64,
    last_reload_roles: u64,
    /// Latency samples in ms (ring buffer)
    samples: Vec<f64>,
}

/// Metrics collector with Prometheus-compatible storage
///
/// Check counters are lock-free so recording a decision never contends with
/// other checks or with a metrics scrape. Reload data sits behind a lock.
#[derive(Debug)]
pub struct MetricsCollector {
    total_checks: AtomicU64,
    allowed_checks: AtomicU64,
    denied_checks: AtomicU64,
    validation_errors: AtomicU64,

    reload: Arc<RwLock<ReloadState>>,

    max_samples: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::with_capacity(1_000)
    }

    /// Create a collector keeping at most `max_samples` latency samples
    pub fn with_capacity(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            total_checks: AtomicU64::new(0),
            allowed_checks: AtomicU64::new(0),
            denied_checks: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            reload: Arc::new(RwLock::new(ReloadState {
                samples: Vec::with_capacity(max_samples),
                ..Default::default()
            })),
            max_samples,
        }
    }

    /// Record a permission decision
    pub fn record_check(&self, allowed: bool) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);

        if allowed {
            self.allowed_checks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied_checks.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a check rejected as malformed
    pub fn record_validation_error(&self) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful reload
    pub async fn record_reload(&self, roles: usize, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut reload = self.reload.write().await;
        reload.reloads += 1;
        reload.last_reload_roles = roles as u64;
        reload.samples.push(latency_ms);

        if reload.samples.len() > self.max_samples {
            let excess = reload.samples.len() - self.max_samples;
            reload.samples.drain(0..excess);
        }
    }

    /// Record a failed reload
    pub async fn record_reload_failure(&self) {
        self.reload.write().await.reload_failures += 1;
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> ServiceMetrics {
        let (reloads, reload_failures, last_reload_roles, mut sorted) = {
            let reload = self.reload.read().await;
            (
                reload.reloads,
                reload.reload_failures,
                reload.last_reload_roles,
                reload.samples.clone(),
            )
        };
        sorted.sort_by(f64::total_cmp);

        let avg_reload_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        ServiceMetrics {
            total_checks: self.total_checks.load(Ordering::Relaxed),
            allowed_checks: self.allowed_checks.load(Ordering::Relaxed),
            denied_checks: self.denied_checks.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            reloads,
            reload_failures,
            last_reload_roles,
            reload_p50_ms: Self::percentile(&sorted, 0.50),
            reload_p90_ms: Self::percentile(&sorted, 0.90),
            reload_p95_ms: Self::percentile(&sorted, 0.95),
            reload_p99_ms: Self::percentile(&sorted, 0.99),
            reload_p999_ms: Self::percentile(&sorted, 0.999),
            avg_reload_ms,
        }
    }

    /// Reset all metrics
    pub async fn reset(&self) {
        self.total_checks.store(0, Ordering::Relaxed);
        self.allowed_checks.store(0, Ordering::Relaxed);
        self.denied_checks.store(0, Ordering::Relaxed);
        self.validation_errors.store(0, Ordering::Relaxed);

        let mut reload = self.reload.write().await;
        *reload = ReloadState::default();
    }

    /// Export metrics in Prometheus format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics().await;

        format!(
            r#"# HELP rbac_checks_total Total number of permission checks
# TYPE rbac_checks_total counter
rbac_checks_total {}

# HELP rbac_allowed_total Number of allowed checks
# TYPE rbac_allowed_total counter
rbac_allowed_total {}

# HELP rbac_denied_total Number of denied checks
# TYPE rbac_denied_total counter
rbac_denied_total {}

# HELP rbac_validation_errors_total Checks rejected as malformed
# TYPE rbac_validation_errors_total counter
rbac_validation_errors_total {}

# HELP rbac_reloads_total Completed reloads from the repository
# TYPE rbac_reloads_total counter
rbac_reloads_total {}

# HELP rbac_reload_failures_total Failed reloads
# TYPE rbac_reload_failures_total counter
rbac_reload_failures_total {}

# HELP rbac_roles_loaded Roles applied by the last reload
# TYPE rbac_roles_loaded gauge
rbac_roles_loaded {}

# HELP rbac_reload_seconds Reload latency percentiles
# TYPE rbac_reload_seconds summary
rbac_reload_seconds{{quantile="0.5"}} {}
rbac_reload_seconds{{quantile="0.9"}} {}
rbac_reload_seconds{{quantile="0.95"}} {}
rbac_reload_seconds{{quantile="0.99"}} {}
rbac_reload_seconds{{quantile="0.999"}} {}
"#,
            metrics.total_checks,
            metrics.allowed_checks,
            metrics.denied_checks,
            metrics.validation_errors,
            metrics.reloads,
            metrics.reload_failures,
            metrics.last_reload_roles,
            metrics.reload_p50_ms / 1000.0,
            metrics.reload_p90_ms / 1000.0,
            metrics.reload_p95_ms / 1000.0,
            metrics.reload_p99_ms / 1000.0,
            metrics.reload_p999_ms / 1000.0,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
