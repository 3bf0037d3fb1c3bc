//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KeystoneConfig {
    /// The root locator.
    #[serde(default)]
    pub locator: LocatorConfig,

    /// Which optional scopes are enabled on the root locator.
    #[serde(default)]
    pub scopes: ScopesConfig,

    /// Immediate scope worker settings.
    #[serde(default)]
    pub immediate: ImmediateConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Locator
// =============================================================================

/// Root locator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Name the root locator is registered under.
    #[serde(default = "default_locator_name")]
    pub name: String,

    /// Whether proxiable scopes produce proxies. When off, every lookup
    /// returns the real instance.
    #[serde(default = "default_true")]
    pub proxies: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            name: default_locator_name(),
            proxies: true,
        }
    }
}

fn default_locator_name() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

/// Optional scopes to enable at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScopesConfig {
    #[serde(default)]
    pub per_thread: bool,

    #[serde(default)]
    pub inheritable_thread: bool,

    #[serde(default)]
    pub immediate: bool,
}

// =============================================================================
// Immediate
// =============================================================================

/// Where the immediate scope runs its reconcile jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// A dedicated named thread per job.
    #[default]
    Thread,
    /// The blocking pool of the current tokio runtime.
    Tokio,
}

/// Immediate scope worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmediateConfig {
    #[serde(default)]
    pub executor: ExecutorKind,

    /// How long an idle worker lingers before exiting.
    #[serde(default = "default_inactivity_ms")]
    pub thread_inactivity_timeout_ms: u64,

    /// Start with reconciliation suspended.
    #[serde(default)]
    pub start_suspended: bool,
}

impl ImmediateConfig {
    /// Returns the inactivity timeout as a duration.
    pub fn thread_inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_inactivity_timeout_ms)
    }
}

impl Default for ImmediateConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::Thread,
            thread_inactivity_timeout_ms: default_inactivity_ms(),
            start_suspended: false,
        }
    }
}

fn default_inactivity_ms() -> u64 {
    60_000
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON. Requires the `json-log` feature.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires `logging.file_path`.
    File,
}

/// How often a file log is rolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether the runtime installs a subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of each event.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-target levels, e.g. `keystone_core = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KeystoneConfig::default();
        assert_eq!(config.locator.name, "default");
        assert!(config.locator.proxies);
        assert_eq!(config.scopes, ScopesConfig::default());
        assert_eq!(config.immediate.thread_inactivity_timeout(), Duration::from_secs(60));
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: KeystoneConfig = serde_json::from_str(
            r#"{ "scopes": { "immediate": true }, "immediate": { "executor": "tokio" } }"#,
        )
        .unwrap();
        assert!(config.scopes.immediate);
        assert!(!config.scopes.per_thread);
        assert_eq!(config.immediate.executor, ExecutorKind::Tokio);
        assert_eq!(config.immediate.thread_inactivity_timeout_ms, 60_000);
        assert_eq!(config.locator.name, "default");
    }
}
