//! Timing budgets and key naming for the sync core.
//!
//! Everything has a default; a config file only needs the values it changes.
//!
//! ```json
//! {
//!   "session_init_timeout_ms": 3000,
//!   "user_data_timeout_ms": 8000,
//!   "failsafe_timeout_ms": 10000,
//!   "max_retries": 2,
//!   "retry_delays_ms": [2000, 4000]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use fs_err as fs;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Budget for the explicit session fetch at boot.
    pub session_init_timeout_ms: u64,
    /// Budget for each profile fetch attempt. Longer than the session budget.
    pub user_data_timeout_ms: u64,
    /// Last-resort bound on the session loading state.
    pub failsafe_timeout_ms: u64,
    /// Extra attempts after the first profile fetch.
    pub max_retries: u32,
    /// Per-retry delays, clamped to the last entry.
    pub retry_delays_ms: Vec<u64>,
    pub organization_timeout_ms: u64,
    pub sign_out_timeout_ms: u64,
    pub session_key_prefix: String,
    pub session_key_suffix: String,
    pub profile_cache_prefix: String,
    /// Where `clear_cache_and_reload` sends the user.
    pub sign_in_path: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            session_init_timeout_ms: 3_000,
            user_data_timeout_ms: 8_000,
            failsafe_timeout_ms: 10_000,
            max_retries: 2,
            retry_delays_ms: vec![2_000, 4_000],
            organization_timeout_ms: 8_000,
            sign_out_timeout_ms: 3_000,
            session_key_prefix: "sb-".to_string(),
            session_key_suffix: "-auth-token".to_string(),
            profile_cache_prefix: "membership:profile-cache:".to_string(),
            sign_in_path: "/login".to_string(),
        }
    }
}

impl SyncConfig {
    /// Loads config from `path`, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return SyncConfig::default();
        }
        match SyncConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "Falling back to default sync config");
                SyncConfig::default()
            }
        }
    }

    /// Strict variant of [`SyncConfig::load`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| SyncError::Io {
            context: format!("reading {}", path.display()),
            source,
        })?;
        serde_json::from_str(&content).map_err(|err| SyncError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    }

    pub fn session_init_timeout(&self) -> Duration {
        Duration::from_millis(self.session_init_timeout_ms)
    }

    pub fn user_data_timeout(&self) -> Duration {
        Duration::from_millis(self.user_data_timeout_ms)
    }

    pub fn failsafe_timeout(&self) -> Duration {
        Duration::from_millis(self.failsafe_timeout_ms)
    }

    pub fn organization_timeout(&self) -> Duration {
        Duration::from_millis(self.organization_timeout_ms)
    }

    pub fn sign_out_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_out_timeout_ms)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn with_session_init_timeout(mut self, timeout: Duration) -> Self {
        self.session_init_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_user_data_timeout(mut self, timeout: Duration) -> Self {
        self.user_data_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_failsafe_timeout(mut self, timeout: Duration) -> Self {
        self.failsafe_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_organization_timeout(mut self, timeout: Duration) -> Self {
        self.organization_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, delays: &[Duration]) -> Self {
        self.max_retries = max_retries;
        self.retry_delays_ms = delays.iter().map(|d| d.as_millis() as u64).collect();
        self
    }

    pub fn with_sign_in_path(mut self, path: impl Into<String>) -> Self {
        self.sign_in_path = path.into();
        self
    }

    pub fn with_profile_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.profile_cache_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_documented_budgets() {
        let config = SyncConfig::default();
        assert_eq!(config.session_init_timeout(), Duration::from_millis(3_000));
        assert_eq!(config.user_data_timeout(), Duration::from_millis(8_000));
        assert_eq!(config.failsafe_timeout(), Duration::from_millis(10_000));
        assert_eq!(config.max_retries, 2);
        assert_eq!(
            config.retry_delays(),
            vec![Duration::from_millis(2_000), Duration::from_millis(4_000)]
        );
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"max_retries": 5, "sign_in_path": "/auth"}"#).unwrap();

        let config = SyncConfig::load(&path);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.sign_in_path, "/auth");
        assert_eq!(config.user_data_timeout_ms, 8_000);
    }

    #[test]
    fn test_malformed_file_loads_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert_eq!(SyncConfig::load(&path), SyncConfig::default());
        assert!(matches!(
            SyncConfig::from_file(&path),
            Err(SyncError::ConfigMalformed { .. })
        ));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let temp = tempdir().unwrap();
        let config = SyncConfig::load(&temp.path().join("absent.json"));
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_builders_override_budgets() {
        let config = SyncConfig::default()
            .with_failsafe_timeout(Duration::from_secs(1))
            .with_retries(1, &[Duration::from_millis(10)]);
        assert_eq!(config.failsafe_timeout_ms, 1_000);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_delays_ms, vec![10]);
    }
}
