//! Cutover configuration
//!
//! Every field has a default so an empty TOML file is a valid config.
//! Durations are stored as plain seconds/milliseconds and exposed as
//! [`Duration`] through accessor methods.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Env var overriding `server.schedule_secret`
pub const ENV_SCHEDULE_SECRET: &str = "CUTOVER_SCHEDULE_SECRET";
/// Env var overriding `server.admin_token`
pub const ENV_ADMIN_TOKEN: &str = "CUTOVER_ADMIN_TOKEN";
/// Env var overriding `server.bind`
pub const ENV_BIND: &str = "CUTOVER_BIND";

/// Longest accepted look-back window or retention period (ten years)
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoverConfig {
    pub thresholds: RollbackThresholds,
    pub phase: PhaseSettings,
    pub reconciliation: ReconciliationSettings,
    pub alerting: AlertingSettings,
    pub metrics: MetricsSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

/// Sustained-degradation thresholds for automated rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackThresholds {
    /// Average error rate above which to roll back (percent)
    pub max_error_rate: f64,
    /// Average data integrity below which to roll back (percent)
    pub min_data_integrity: f64,
    /// Aggregate failure rate above which to roll back (percent)
    pub max_failure_rate: f64,
    /// Samples required before any decision
    pub min_samples: usize,
    /// How far back samples are considered
    pub evaluation_window_secs: u64,
}

impl Default for RollbackThresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 5.0,
            min_data_integrity: 98.0,
            max_failure_rate: 3.0,
            min_samples: 10,
            evaluation_window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSettings {
    /// Phase cache time-to-live
    pub cache_ttl_ms: u64,
    /// Capacity of the phase-change broadcast channel
    pub event_capacity: usize,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 2000,
            event_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationSettings {
    /// Records examined per pass
    pub batch_size: usize,
    /// Wall-clock budget per pass
    pub batch_time_budget_ms: u64,
    /// Every n-th pass also walks the full record set; 0 disables
    pub full_scan_every: u64,
    /// Key fields compared per entity type; whole payload when absent
    pub compare_fields: HashMap<String, Vec<String>>,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            batch_time_budget_ms: 5000,
            full_scan_every: 12,
            compare_fields: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingSettings {
    /// Retries after the first notification attempt
    pub notification_retries: u32,
    pub notification_retry_delay_ms: u64,
    /// How long an alert counts as active without a resolving recovery
    pub alert_active_window_secs: u64,
    /// Open discrepancies synced by one backlog recovery
    pub recovery_backlog_limit: usize,
    /// Webhook receiving alert notices; alerts are only logged when unset
    pub webhook_url: Option<String>,
    pub webhook_timeout_ms: u64,
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            notification_retries: 2,
            notification_retry_delay_ms: 200,
            alert_active_window_secs: 3600,
            recovery_backlog_limit: 200,
            webhook_url: None,
            webhook_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Journaled operations older than this are pruned
    pub operation_retention_secs: u64,
    /// Samples shown on the dashboard
    pub dashboard_sample_limit: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            operation_retention_secs: 86_400,
            dashboard_sample_limit: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Header carrying the scheduler's shared secret
    pub schedule_header: String,
    pub schedule_secret: Option<String>,
    /// Bearer token for administrator endpoints
    pub admin_token: Option<String>,
    /// In-process ticker interval
    pub tick_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            schedule_header: "x-cron-secret".to_string(),
            schedule_secret: None,
            admin_token: None,
            tick_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl CutoverConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read, apply env overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without overrides or validation
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply env-style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(ENV_SCHEDULE_SECRET) {
            self.server.schedule_secret = Some(secret);
        }
        if let Some(token) = lookup(ENV_ADMIN_TOKEN) {
            self.server.admin_token = Some(token);
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.server.bind = bind;
        }
    }

    /// Reject values no deployment could mean
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (field, value) in [
            ("thresholds.max_error_rate", t.max_error_rate),
            ("thresholds.min_data_integrity", t.min_data_integrity),
            ("thresholds.max_failure_rate", t.max_failure_rate),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::invalid(
                    field,
                    format!("{value} is not a percentage"),
                ));
            }
        }
        if t.min_samples == 0 {
            return Err(ConfigError::invalid(
                "thresholds.min_samples",
                "must be at least 1",
            ));
        }
        if t.evaluation_window_secs == 0 {
            return Err(ConfigError::invalid(
                "thresholds.evaluation_window_secs",
                "must be positive",
            ));
        }
        for (field, value) in [
            (
                "thresholds.evaluation_window_secs",
                t.evaluation_window_secs,
            ),
            (
                "alerting.alert_active_window_secs",
                self.alerting.alert_active_window_secs,
            ),
            (
                "metrics.operation_retention_secs",
                self.metrics.operation_retention_secs,
            ),
        ] {
            if value > MAX_WINDOW_SECS {
                return Err(ConfigError::invalid(
                    field,
                    format!("{value} exceeds {MAX_WINDOW_SECS} seconds"),
                ));
            }
        }
        if self.reconciliation.batch_size == 0 {
            return Err(ConfigError::invalid(
                "reconciliation.batch_size",
                "must be at least 1",
            ));
        }
        if self.phase.event_capacity == 0 {
            return Err(ConfigError::invalid(
                "phase.event_capacity",
                "must be at least 1",
            ));
        }
        if self.server.schedule_header.trim().is_empty() {
            return Err(ConfigError::invalid(
                "server.schedule_header",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// With rollback thresholds
    #[inline]
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: RollbackThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// With minimum sample count
    #[inline]
    #[must_use]
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.thresholds.min_samples = min_samples;
        self
    }

    /// With phase cache TTL
    #[inline]
    #[must_use]
    pub fn with_phase_cache_ttl(mut self, ttl: Duration) -> Self {
        self.phase.cache_ttl_ms = duration_millis(ttl);
        self
    }

    /// With reconciliation batch size
    #[inline]
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.reconciliation.batch_size = batch_size;
        self
    }

    /// With full-scan cadence
    #[inline]
    #[must_use]
    pub fn with_full_scan_every(mut self, passes: u64) -> Self {
        self.reconciliation.full_scan_every = passes;
        self
    }

    /// With compared key fields for one entity type
    #[must_use]
    pub fn with_compare_fields(
        mut self,
        entity_type: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.reconciliation
            .compare_fields
            .insert(entity_type.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// With notification retry policy
    #[inline]
    #[must_use]
    pub fn with_notification_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.alerting.notification_retries = retries;
        self.alerting.notification_retry_delay_ms = duration_millis(delay);
        self
    }

    #[inline]
    #[must_use]
    pub fn phase_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.phase.cache_ttl_ms)
    }

    #[inline]
    #[must_use]
    pub fn batch_time_budget(&self) -> Duration {
        Duration::from_millis(self.reconciliation.batch_time_budget_ms)
    }

    #[inline]
    #[must_use]
    pub fn notification_retry_delay(&self) -> Duration {
        Duration::from_millis(self.alerting.notification_retry_delay_ms)
    }

    #[inline]
    #[must_use]
    pub fn evaluation_window(&self) -> chrono::Duration {
        seconds(self.thresholds.evaluation_window_secs)
    }

    #[inline]
    #[must_use]
    pub fn alert_active_window(&self) -> chrono::Duration {
        seconds(self.alerting.alert_active_window_secs)
    }

    #[inline]
    #[must_use]
    pub fn operation_retention(&self) -> chrono::Duration {
        seconds(self.metrics.operation_retention_secs)
    }

    #[inline]
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.server.tick_interval_secs.max(1))
    }

    #[inline]
    #[must_use]
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.alerting.webhook_timeout_ms)
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn seconds(secs: u64) -> chrono::Duration {
    // Bounded by validate(); clamped for configs built in code
    let secs = i64::try_from(secs.min(MAX_WINDOW_SECS)).unwrap_or(0);
    chrono::Duration::seconds(secs)
}
