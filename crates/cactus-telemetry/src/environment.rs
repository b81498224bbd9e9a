//! Telemetry environment configuration.
//!
//! The environment names the host framework, the cache directory that holds
//! `completion.log`, and whether flushed events may be forwarded to the cloud.
//! A recorder snapshots the environment when a session starts, so later
//! changes only apply to the next `init`.

use std::path::PathBuf;

use crate::error::{Result, TelemetryError};

/// Framework name used when none has been configured.
pub const DEFAULT_FRAMEWORK: &str = "rust";

/// File name of the append-only completion log inside the cache directory.
pub const COMPLETION_LOG_FILE: &str = "completion.log";

/// Environment variable overriding the framework name.
pub const ENV_FRAMEWORK: &str = "CACTUS_TELEMETRY_FRAMEWORK";

/// Environment variable overriding the cache directory.
pub const ENV_CACHE_DIR: &str = "CACTUS_TELEMETRY_CACHE_DIR";

/// Environment variable disabling cloud upload when set to a truthy value.
pub const ENV_NO_CLOUD: &str = "CACTUS_NO_CLOUD_TELE";

/// Settings read by the recorder at `init` time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEnvironment {
    /// Host framework identifier (e.g. "cpp", "flutter", "react-native").
    pub framework: String,
    /// Directory holding `completion.log`. Falls back to the platform cache
    /// directory when unset.
    pub cache_location: Option<PathBuf>,
    /// When true, flushed events are kept local only.
    pub cloud_disabled: bool,
}

impl Default for TelemetryEnvironment {
    fn default() -> Self {
        Self {
            framework: DEFAULT_FRAMEWORK.to_string(),
            cache_location: None,
            cloud_disabled: false,
        }
    }
}

impl TelemetryEnvironment {
    /// Create an environment for a framework writing under `cache_location`.
    pub fn new(framework: impl Into<String>, cache_location: impl Into<PathBuf>) -> Self {
        Self {
            framework: framework.into(),
            cache_location: Some(cache_location.into()),
            ..Default::default()
        }
    }

    /// Create from environment variables.
    ///
    /// Reads:
    /// - `CACTUS_TELEMETRY_FRAMEWORK` - framework name (default: "rust")
    /// - `CACTUS_TELEMETRY_CACHE_DIR` - cache directory (default: platform cache dir)
    /// - `CACTUS_NO_CLOUD_TELE` - disables cloud upload when truthy
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build an environment from an arbitrary key lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let framework = lookup(ENV_FRAMEWORK)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FRAMEWORK.to_string());
        let cache_location = lookup(ENV_CACHE_DIR)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let cloud_disabled = lookup(ENV_NO_CLOUD)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        Self {
            framework,
            cache_location,
            cloud_disabled,
        }
    }

    /// Set the framework name.
    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = framework.into();
        self
    }

    /// Set the cache directory.
    pub fn with_cache_location(mut self, cache_location: impl Into<PathBuf>) -> Self {
        self.cache_location = Some(cache_location.into());
        self
    }

    /// Enable or disable cloud upload.
    pub fn with_cloud_disabled(mut self, disabled: bool) -> Self {
        self.cloud_disabled = disabled;
        self
    }

    /// Resolve the directory that holds the completion log.
    ///
    /// Priority:
    /// 1. The configured `cache_location`
    /// 2. `<platform cache dir>/cactus/telemetry`
    pub fn resolve_cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_location {
            Some(path) if path.as_os_str().is_empty() => Err(TelemetryError::Config(
                "cache location is empty".to_string(),
            )),
            Some(path) => Ok(path.clone()),
            None => dirs::cache_dir()
                .map(|dir| dir.join("cactus").join("telemetry"))
                .ok_or_else(|| {
                    TelemetryError::Config(
                        "no cache location configured and no platform cache directory found"
                            .to_string(),
                    )
                }),
        }
    }

    /// Path of the completion log for this environment.
    pub fn completion_log_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_cache_dir()?.join(COMPLETION_LOG_FILE))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let env = TelemetryEnvironment::default();
        assert_eq!(env.framework, "rust");
        assert!(env.cache_location.is_none());
        assert!(!env.cloud_disabled);
    }

    #[test]
    fn test_builder() {
        let env = TelemetryEnvironment::new("cpp-test", "/tmp/cactus")
            .with_cloud_disabled(true)
            .with_framework("flutter");
        assert_eq!(env.framework, "flutter");
        assert_eq!(env.cache_location, Some(PathBuf::from("/tmp/cactus")));
        assert!(env.cloud_disabled);
    }

    #[test]
    fn test_from_lookup_reads_all_keys() {
        let env = TelemetryEnvironment::from_lookup(lookup_from(&[
            (ENV_FRAMEWORK, "kotlin"),
            (ENV_CACHE_DIR, "/data/cactus"),
            (ENV_NO_CLOUD, "TRUE"),
        ]));
        assert_eq!(env.framework, "kotlin");
        assert_eq!(env.cache_location, Some(PathBuf::from("/data/cactus")));
        assert!(env.cloud_disabled);
    }

    #[test]
    fn test_from_lookup_ignores_blank_values() {
        let env = TelemetryEnvironment::from_lookup(lookup_from(&[
            (ENV_FRAMEWORK, "  "),
            (ENV_CACHE_DIR, ""),
            (ENV_NO_CLOUD, "0"),
        ]));
        assert_eq!(env, TelemetryEnvironment::default());
    }

    #[test]
    fn test_resolve_configured_cache_dir() {
        let env = TelemetryEnvironment::new("cpp", "/tmp/cactus-cache");
        assert_eq!(
            env.completion_log_path().unwrap(),
            PathBuf::from("/tmp/cactus-cache/completion.log")
        );
    }

    #[test]
    fn test_resolve_rejects_empty_path() {
        let env = TelemetryEnvironment::new("cpp", "");
        let err = env.resolve_cache_dir().unwrap_err();
        assert!(matches!(err, TelemetryError::Config(_)));
    }
}
