//! Engine configuration
//!
//! Loaded from TOML, refined by environment overrides and builder methods,
//! and validated before use.

use crate::error::ConfigError;
use crate::types::WidgetSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `backend.base_url`
pub const ENV_BASE_URL: &str = "MENTORLENS_BASE_URL";
/// Environment variable overriding `backend.bearer_token`
pub const ENV_TOKEN: &str = "MENTORLENS_TOKEN";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendConfig,
    pub poller: PollerConfig,
    /// Default `tracing` filter when `RUST_LOG` is unset
    pub log_filter: String,
    /// File remembering the last used widget view, if any
    pub view_state_path: Option<PathBuf>,
    /// Widgets known to the CLI
    pub widgets: Vec<WidgetSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            poller: PollerConfig::default(),
            log_filter: "info".to_string(),
            view_state_path: None,
            widgets: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `MENTORLENS_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.backend.base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.backend.bearer_token = Some(token);
        }
        self
    }

    /// With backend base URL
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.backend.base_url = url.into();
        self
    }

    /// With poll intervals
    #[inline]
    #[must_use]
    pub fn with_poll_intervals(mut self, base: Duration, ceiling: Duration) -> Self {
        self.poller = PollerConfig::from_durations(base, ceiling);
        self
    }

    /// Look up a widget by name
    #[must_use]
    pub fn widget(&self, name: &str) -> Option<&WidgetSpec> {
        self.widgets.iter().find(|w| w.name == name)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url must not be empty".into()));
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("backend.request_timeout_ms must be positive".into()));
        }
        self.poller.validate()?;
        for widget in &self.widgets {
            if widget.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("widget {} has no endpoint", widget.name)));
            }
        }
        Ok(())
    }
}

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub bearer_token: Option<String>,
    pub routes: RouteConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 10_000,
            bearer_token: None,
            routes: RouteConfig::default(),
        }
    }
}

impl BackendConfig {
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Collaborator routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Coordinator program lookup; `{user_id}` is substituted
    pub program_lookup: String,
    /// Notification feed; the feed id is sent as the `feed` query parameter
    pub notifications: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            program_lookup: "/api/coordinators/{user_id}/programs".to_string(),
            notifications: "/api/notifications".to_string(),
        }
    }
}

/// Adaptive poller intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub base_interval_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 5_000,
            ceiling_ms: 60_000,
        }
    }
}

impl PollerConfig {
    #[must_use]
    pub fn from_durations(base: Duration, ceiling: Duration) -> Self {
        Self {
            base_interval_ms: u64::try_from(base.as_millis()).unwrap_or(u64::MAX),
            ceiling_ms: u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[inline]
    #[must_use]
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_interval_ms == 0 {
            return Err(ConfigError::Invalid("poller.base_interval_ms must be positive".into()));
        }
        if self.ceiling_ms < self.base_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "poller.ceiling_ms ({}) is below base_interval_ms ({})",
                self.ceiling_ms, self.base_interval_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.poller.base_interval(), Duration::from_secs(5));
        assert_eq!(config.poller.ceiling(), Duration::from_secs(60));
    }

    #[test]
    fn parses_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            log_filter = "mentorlens=debug"

            [backend]
            base_url = "https://dash.example.org"

            [poller]
            base_interval_ms = 2000

            [[widgets]]
            name = "sessions"
            endpoint = "/api/analytics/sessions"
            timestamp_field = "session_date"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.base_url, "https://dash.example.org");
        assert_eq!(config.backend.request_timeout_ms, 10_000);
        assert_eq!(config.poller.base_interval_ms, 2000);
        assert_eq!(config.poller.ceiling_ms, 60_000);
        assert_eq!(config.widget("sessions").unwrap().timestamp_field, "session_date");
        assert!(config.widget("missing").is_none());
    }

    #[test]
    fn rejects_ceiling_below_base() {
        let raw = "[poller]\nbase_interval_ms = 9000\nceiling_ms = 1000";
        let err = EngineConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = EngineConfig::from_toml_str("[backend\nbase_url = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let config = EngineConfig::new().with_overrides(|key| match key {
            ENV_BASE_URL => Some("https://override.example".to_string()),
            ENV_TOKEN => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.backend.base_url, "https://override.example");
        assert_eq!(config.backend.bearer_token.as_deref(), Some("secret"));
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let config = EngineConfig::new().with_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.backend.bearer_token, None);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nbase_url = \"https://file.example\"").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.backend.base_url, "https://file.example");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn builder_sets_intervals() {
        let config = EngineConfig::new()
            .with_base_url("https://x")
            .with_poll_intervals(Duration::from_millis(100), Duration::from_millis(800));
        assert_eq!(config.poller.base_interval_ms, 100);
        assert_eq!(config.poller.ceiling_ms, 800);
    }
}
