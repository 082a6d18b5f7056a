//! Lifecycle Configuration
//!
//! Timeouts for remote calls and the two deletion convergence loops.
//! Values are plain seconds so the file format stays readable; use the
//! `Duration` accessors in code.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default timeout applied to every remote call (5 minutes)
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Convergence Settings
// =============================================================================

/// Settings for one bounded polling loop.
///
/// The timeout and initial delay differ between loops, so a loop given in a
/// config file must spell them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceSettings {
    /// Overall time budget for the loop, including the initial delay
    pub timeout_secs: u64,
    /// Minimum wait between two attempts
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    /// Wait before the first attempt
    pub delay_secs: u64,
    /// Consecutive attempts without an answer tolerated before giving up
    #[serde(default)]
    pub not_found_checks: u32,
}

fn default_min_interval_secs() -> u64 {
    2
}

impl ConvergenceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Retry loop used to remove a datastore that may still be busy
    pub fn delete_retry() -> Self {
        Self {
            timeout_secs: 30,
            min_interval_secs: default_min_interval_secs(),
            delay_secs: 2,
            not_found_checks: 0,
        }
    }

    /// Poll loop used to wait until a removed datastore is no longer visible
    pub fn delete_wait() -> Self {
        Self {
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            min_interval_secs: default_min_interval_secs(),
            delay_secs: 1,
            not_found_checks: 35,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::Configuration(format!(
                "{}.timeout_secs must be greater than zero",
                name
            )));
        }
        if self.min_interval_secs > self.timeout_secs {
            return Err(Error::Configuration(format!(
                "{}.min_interval_secs ({}) exceeds timeout_secs ({})",
                name, self.min_interval_secs, self.timeout_secs
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Lifecycle Configuration
// =============================================================================

/// Configuration for the datastore lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Timeout for each create/extend/remove/rename/move/fetch call
    pub api_timeout_secs: u64,
    /// Timeout for a single visibility probe while waiting for deletion
    pub probe_timeout_secs: u64,
    /// Retry-on-conflict loop for removal
    pub delete_retry: ConvergenceSettings,
    /// Wait-for-invisibility loop after removal
    pub delete_wait: ConvergenceSettings,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            probe_timeout_secs: 10,
            delete_retry: ConvergenceSettings::delete_retry(),
            delete_wait: ConvergenceSettings::delete_wait(),
        }
    }
}

impl LifecycleConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Override the API timeout, keeping the deletion wait aligned with it
    pub fn with_api_timeout(mut self, secs: u64) -> Self {
        if self.delete_wait.timeout_secs == self.api_timeout_secs {
            self.delete_wait.timeout_secs = secs;
        }
        self.api_timeout_secs = secs;
        self
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: LifecycleConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate timeouts
    pub fn validate(&self) -> Result<()> {
        if self.api_timeout_secs == 0 {
            return Err(Error::Configuration(
                "api_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.probe_timeout_secs == 0 {
            return Err(Error::Configuration(
                "probe_timeout_secs must be greater than zero".into(),
            ));
        }
        self.delete_retry.validate("delete_retry")?;
        self.delete_wait.validate("delete_wait")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tokio_test::assert_ok;

    #[test]
    fn test_defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.api_timeout(), Duration::from_secs(300));
        assert_eq!(config.delete_retry.timeout(), Duration::from_secs(30));
        assert_eq!(config.delete_retry.delay(), Duration::from_secs(2));
        assert_eq!(config.delete_wait.timeout(), config.api_timeout());
        assert_eq!(config.delete_wait.not_found_checks, 35);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_api_timeout_override_moves_wait_loop() {
        let config = LifecycleConfig::default().with_api_timeout(60);
        assert_eq!(config.api_timeout_secs, 60);
        assert_eq!(config.delete_wait.timeout_secs, 60);
        assert_eq!(config.delete_retry.timeout_secs, 30);
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "api_timeout_secs: 120\ndelete_retry:\n  timeout_secs: 10\n  delay_secs: 1"
        )
        .unwrap();

        let config = LifecycleConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.api_timeout_secs, 120);
        assert_eq!(config.delete_retry.timeout_secs, 10);
        assert_eq!(config.delete_retry.min_interval_secs, 2);
        assert_eq!(config.delete_retry.not_found_checks, 0);
        // Unset sections fall back to the lifecycle defaults
        assert_eq!(config.probe_timeout_secs, 10);
        assert_eq!(config.delete_wait, ConvergenceSettings::delete_wait());
    }

    #[test]
    fn test_loop_without_timeout_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "delete_wait:\n  delay_secs: 1").unwrap();

        assert_matches!(
            LifecycleConfig::from_yaml_file(file.path()),
            Err(Error::YamlParse(_))
        );
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = LifecycleConfig::default();
        config.delete_retry.timeout_secs = 0;
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }
}
