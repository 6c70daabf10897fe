//! Configuration types for SOAP cache key derivation.

use crate::error::CacheKeyError;
use crate::parser::SOAP_ACTION_HEADER;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable naming the application server install root.
pub const INSTALL_ROOT_ENV: &str = "USER_INSTALL_ROOT";
/// Overrides `rules.path`.
pub const RULES_PATH_ENV: &str = "SOAP_CACHE_RULES_PATH";
/// Overrides `rules.reload_interval_ms`.
pub const RELOAD_INTERVAL_ENV: &str = "SOAP_CACHE_RELOAD_INTERVAL_MS";

/// Lowest reload interval accepted unless configured otherwise.
pub const DEFAULT_MIN_RELOAD_INTERVAL_MS: u64 = 3000;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheKeyConfig {
    /// Config version
    pub version: String,

    /// Request handling settings
    pub settings: SettingsConfig,

    /// Eligibility rule source
    pub rules: RulesConfig,
}

impl Default for CacheKeyConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: SettingsConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

impl CacheKeyConfig {
    /// Load configuration from a YAML file, using defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, CacheKeyError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, CacheKeyError> {
        serde_yaml::from_str(content).map_err(|e| CacheKeyError::Config(e.to_string()))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using the given variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(RULES_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            self.rules.path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(RELOAD_INTERVAL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.rules.reload_interval_ms = ms,
                Err(_) => {
                    warn!(
                        value = %raw,
                        fallback_ms = self.rules.min_reload_interval_ms,
                        "Invalid reload interval, using floor"
                    );
                    self.rules.reload_interval_ms = self.rules.min_reload_interval_ms;
                }
            }
        }
    }
}

/// Request handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Header carrying the SOAP operation identifier
    pub action_header: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            action_header: SOAP_ACTION_HEADER.to_string(),
        }
    }
}

/// Rule source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Path of the `key=value` rule file
    pub path: PathBuf,

    /// Requested interval between modification checks
    pub reload_interval_ms: u64,

    /// Floor applied to `reload_interval_ms`
    pub min_reload_interval_ms: u64,

    /// How pattern keys are interpreted
    pub pattern_syntax: PatternSyntax,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: default_rules_path(std::env::var(INSTALL_ROOT_ENV).ok().as_deref()),
            reload_interval_ms: DEFAULT_MIN_RELOAD_INTERVAL_MS,
            min_reload_interval_ms: DEFAULT_MIN_RELOAD_INTERVAL_MS,
            pattern_syntax: PatternSyntax::default(),
        }
    }
}

impl RulesConfig {
    /// Rules file at `path` with default timing.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Interval the reload timer actually uses, clamped up to the floor.
    pub fn effective_reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms.max(self.min_reload_interval_ms))
    }
}

/// Location of the rule file below an install root.
pub fn default_rules_path(install_root: Option<&str>) -> PathBuf {
    let relative = Path::new("properties").join("cache-enable.properties");
    match install_root {
        Some(root) if !root.is_empty() => Path::new(root).join(relative),
        _ => relative,
    }
}

/// Interpretation of pattern rule keys.
///
/// Rule files written with regular expressions (`get.*=wildcard`) need
/// `pattern_syntax: regex`; under the default they are read as globs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternSyntax {
    /// Shell-style wildcards (`get*`, `list?ccounts`)
    #[default]
    Glob,
    /// Regular expressions, matched against the whole identifier
    Regex,
}
