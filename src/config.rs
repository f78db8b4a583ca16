//! Configuration for deployment-test runs.
//!
//! Every field has a default matching the stock Remix deployment scripts, so
//! a config file only needs to name what it overrides.

use std::env::VarError;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable that points the CLI at a config file.
pub const CONFIG_ENV_VAR: &str = "DEPLOY_TEST_CONFIG";

/// Settings for the availability poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between resolution attempts.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Total attempts, including the first.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_attempts() -> u32 {
    10
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            attempts: default_attempts(),
        }
    }
}

impl PollConfig {
    /// Returns the polling interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Top-level configuration for the deployment-test helpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTestConfig {
    /// Package manager used to run the e2e scripts.
    #[serde(default = "default_package_manager")]
    pub package_manager: String,

    /// Prefix for generated app names.
    #[serde(default = "default_app_prefix")]
    pub app_prefix: String,

    /// Environment variable carrying the target URL into the test runner.
    #[serde(default = "default_base_url_env")]
    pub base_url_env: String,

    /// Availability poller settings.
    #[serde(default)]
    pub poll: PollConfig,
}

fn default_package_manager() -> String {
    "npm".to_string()
}

fn default_app_prefix() -> String {
    "remix".to_string()
}

fn default_base_url_env() -> String {
    "CYPRESS_BASE_URL".to_string()
}

impl Default for DeployTestConfig {
    fn default() -> Self {
        Self {
            package_manager: default_package_manager(),
            app_prefix: default_app_prefix(),
            base_url_env: default_base_url_env(),
            poll: PollConfig::default(),
        }
    }
}

impl DeployTestConfig {
    /// Loads a config file, choosing YAML or TOML by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("toml") => Self::from_toml_str(&content)?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config format {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };

        let warnings = config.validate().into_result()?;
        for warning in warnings {
            tracing::warn!(path = %path.display(), "{}", warning);
        }

        Ok(config)
    }

    /// Loads the file named by `DEPLOY_TEST_CONFIG`, or the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_var(std::env::var(CONFIG_ENV_VAR))
    }

    fn from_var(var: std::result::Result<String, VarError>) -> Result<Self> {
        match var {
            Ok(path) => Self::load(path),
            Err(VarError::NotPresent) => Ok(Self::default()),
            Err(VarError::NotUnicode(path)) => Err(Error::Config(format!(
                "{} is not valid unicode: {:?}",
                CONFIG_ENV_VAR, path
            ))),
        }
    }

    /// Parses a TOML config.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Parses a YAML config.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }
}

/// Problems found while checking a config.
///
/// Errors make the config unusable; warnings are logged and ignored.
#[derive(Debug, Clone, Default)]
pub struct ConfigIssues {
    /// Fatal problems.
    pub errors: Vec<String>,
    /// Suspicious but usable settings.
    pub warnings: Vec<String>,
}

impl ConfigIssues {
    /// Returns true if no errors were found.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fails with every error joined, or returns the warnings.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

impl PollConfig {
    /// Checks the poll settings.
    pub fn validate(&self) -> ConfigIssues {
        let mut issues = ConfigIssues::default();
        self.check(&mut issues);
        issues
    }

    fn check(&self, issues: &mut ConfigIssues) {
        if self.attempts == 0 {
            issues.errors.push("poll.attempts must be at least 1".to_string());
        }

        if self.interval_secs == 0 {
            issues.errors.push("poll.interval_secs must be at least 1".to_string());
        }

        // A deploy that needs more than an hour to resolve is almost always stuck
        if self.interval_secs.saturating_mul(u64::from(self.attempts)) > 3600 {
            issues.warnings.push("poll budget exceeds one hour".to_string());
        }
    }
}

impl DeployTestConfig {
    /// Checks every setting, including the poll settings.
    pub fn validate(&self) -> ConfigIssues {
        let mut issues = ConfigIssues::default();

        for (field, value) in [
            ("package_manager", &self.package_manager),
            ("app_prefix", &self.app_prefix),
            ("base_url_env", &self.base_url_env),
        ] {
            if value.trim().is_empty() {
                issues.errors.push(format!("{} cannot be empty", field));
            }
        }

        if self.base_url_env.contains('=') {
            issues.errors.push("base_url_env cannot contain '='".to_string());
        }

        if !self
            .app_prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            issues.warnings.push(format!(
                "app_prefix '{}' contains characters most hosts reject in app names",
                self.app_prefix
            ));
        }

        self.poll.check(&mut issues);
        issues
    }
}
