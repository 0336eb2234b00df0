mod auth;
mod compression;
mod jobs;

pub use auth::*;
pub use compression::*;
pub use jobs::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Coordinator URLs, tried in order by the host resolver.
    #[serde(default = "d_hosts")]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub resolver: ResolverStrategy,
    /// Database every request is scoped to (`/_db/<name>`).
    #[serde(default = "d_database")]
    pub database: String,
    #[serde(default = "d_60000")]
    pub request_timeout_ms: u64,
    #[serde(default = "d_10000")]
    pub connect_timeout_ms: u64,
    #[serde(default = "d_32")]
    pub pool_max_idle_per_host: usize,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub jobs: JobConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: d_hosts(),
            resolver: ResolverStrategy::default(),
            database: d_database(),
            request_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            pool_max_idle_per_host: 32,
            auth: AuthConfig::default(),
            compression: CompressionConfig::default(),
            jobs: JobConfig::default(),
        }
    }
}

/// How the host resolver picks a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverStrategy {
    /// Stick with one host; move on only when it becomes unreachable.
    #[default]
    Single,
    /// Advance to the next host on every request.
    #[serde(alias = "round_robin", alias = "round-robin")]
    RoundRobin,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_hosts() -> Vec<String> {
    vec!["http://127.0.0.1:8529".into()]
}
fn d_database() -> String {
    "_system".into()
}
fn d_60000() -> u64 {
    60_000
}
fn d_10000() -> u64 {
    10_000
}
fn d_32() -> usize {
    32
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ClientConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut error = |field: String, message: &str| {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field,
                message: message.into(),
            })
        };

        if self.hosts.is_empty() {
            error("hosts".into(), "at least one host is required");
        }
        for (i, host) in self.hosts.iter().enumerate() {
            if !(host.starts_with("http://") || host.starts_with("https://")) {
                error(
                    format!("hosts[{i}]"),
                    "host must be an http:// or https:// URL",
                );
            }
        }
        if self.database.is_empty() {
            error("database".into(), "database name must not be empty");
        }
        if self.compression.level > 9 {
            error("compression.level".into(), "level must be between 0 and 9");
        }
        if self.request_timeout_ms == 0 {
            error("request_timeout_ms".into(), "timeout must be greater than 0");
        }
        if self.jobs.poll_interval_ms == 0 {
            error("jobs.poll_interval_ms".into(), "poll interval must be greater than 0");
        }

        match self.auth.method {
            AuthMethod::Basic if self.auth.username.is_none() => {
                error("auth.username".into(), "basic auth requires a username");
            }
            AuthMethod::Superuser if !self.auth.has_token_source() => {
                error("auth.token".into(), "superuser auth requires token or token_env");
            }
            AuthMethod::Jwt if !self.auth.has_token_source() && self.auth.username.is_none() => {
                error(
                    "auth".into(),
                    "jwt auth requires a token or a username to fetch one",
                );
            }
            _ => {}
        }

        if self.jobs.max_poll_interval_ms < self.jobs.poll_interval_ms {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "jobs.max_poll_interval_ms".into(),
                message: "smaller than poll_interval_ms; polling will not back off".into(),
            });
        }
        if self.resolver == ResolverStrategy::RoundRobin && self.hosts.len() == 1 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "resolver".into(),
                message: "roundrobin with a single host behaves like single".into(),
            });
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
