//! Configuration for the orchestrator core.
//!
//! Grounded in the teacher's `RalphConfig`: a single nested document loaded
//! via `serde_yaml`, paired with a `validate()` that returns advisory
//! warnings rather than failing on fields it merely doesn't act on yet.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level orchestrator configuration, loaded from `./.atomic/config.yml`
/// or `~/.atomic/config.yml` (see spec §6 "Environment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Root directory for workflow sessions (spec §4.8):
    /// `<sessions_root>/<sessionId>/`.
    #[serde(default = "default_sessions_root")]
    pub sessions_root: PathBuf,

    /// Backend adapter settings, keyed by backend name (`claude`, `kiro`, ...).
    #[serde(default)]
    pub adapters: HashMap<String, AdapterSettings>,

    /// Ralph workflow defaults; overridable per-invocation.
    #[serde(default)]
    pub ralph: RalphConfig,

    /// Suppresses advisory warnings emitted by [`OrchestratorConfig::validate`].
    #[serde(default)]
    pub suppress_warnings: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sessions_root: default_sessions_root(),
            adapters: HashMap::new(),
            ralph: RalphConfig::default(),
            suppress_warnings: false,
        }
    }
}

fn default_sessions_root() -> PathBuf {
    PathBuf::from(".atomic/workflows/sessions")
}

/// Per-backend adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Transient-I/O retry budget (spec §7: "capped ~5 attempts").
    #[serde(default = "default_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Command used to invoke this backend, if it shells out (stream/rpc).
    #[serde(default)]
    pub command: Option<String>,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retry_attempts: default_retry_attempts(),
            command: None,
        }
    }
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

/// Ralph workflow safety caps and defaults (spec §4.7 / §8 invariant 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RalphConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub max_runtime_seconds: Option<u64>,
    #[serde(default)]
    pub max_cost_usd: Option<f64>,

    /// DEFERRED: accepted but not yet acted on; `validate()` warns if set.
    #[serde(default)]
    pub archive_prompts: bool,
    /// DEFERRED: accepted but not yet acted on; `validate()` warns if set.
    #[serde(default)]
    pub enable_metrics: bool,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_runtime_seconds: None,
            max_cost_usd: None,
            archive_prompts: false,
            enable_metrics: false,
        }
    }
}

fn default_max_iterations() -> u32 {
    25
}

/// Hard ceiling on `max_iterations` regardless of configuration (spec §8
/// invariant 4: "reaches at most `maxIterations` (hard cap 100)").
pub const MAX_ITERATIONS_HARD_CAP: u32 = 100;

/// An advisory, non-fatal configuration issue surfaced by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recognized but not-yet-implemented feature was turned on.
    DeferredFeature { field: &'static str },
    /// `max_iterations` was clamped down to the hard cap.
    ClampedToHardCap { requested: u32, clamped: u32 },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::DeferredFeature { field } => {
                write!(f, "warning: '{field}' is accepted but not yet implemented")
            }
            ConfigWarning::ClampedToHardCap { requested, clamped } => write!(
                f,
                "warning: max_iterations {requested} exceeds the hard cap, clamped to {clamped}"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OrchestratorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Clamps `max_iterations` to the hard cap and flags deferred features.
    /// Mirrors the teacher's `validate() -> Vec<ConfigWarning>` shape: never
    /// fails the run, only surfaces things worth telling the operator about.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.ralph.max_iterations > MAX_ITERATIONS_HARD_CAP {
            warnings.push(ConfigWarning::ClampedToHardCap {
                requested: self.ralph.max_iterations,
                clamped: MAX_ITERATIONS_HARD_CAP,
            });
            self.ralph.max_iterations = MAX_ITERATIONS_HARD_CAP;
        }

        if self.ralph.archive_prompts {
            warnings.push(ConfigWarning::DeferredFeature {
                field: "ralph.archive_prompts",
            });
        }
        if self.ralph.enable_metrics {
            warnings.push(ConfigWarning::DeferredFeature {
                field: "ralph.enable_metrics",
            });
        }

        if self.suppress_warnings {
            Vec::new()
        } else {
            warnings
        }
    }

    pub fn adapter_settings(&self, backend: &str) -> AdapterSettings {
        self.adapters.get(backend).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.ralph.max_iterations, 25);
        assert_eq!(config.sessions_root, PathBuf::from(".atomic/workflows/sessions"));
    }

    #[test]
    fn max_iterations_is_clamped_to_hard_cap() {
        let mut config = OrchestratorConfig {
            ralph: RalphConfig {
                max_iterations: 500,
                ..RalphConfig::default()
            },
            ..OrchestratorConfig::default()
        };
        let warnings = config.validate();
        assert_eq!(config.ralph.max_iterations, MAX_ITERATIONS_HARD_CAP);
        assert_eq!(
            warnings,
            vec![ConfigWarning::ClampedToHardCap {
                requested: 500,
                clamped: 100
            }]
        );
    }

    #[test]
    fn deferred_features_warn_but_do_not_fail() {
        let mut config = OrchestratorConfig {
            ralph: RalphConfig {
                enable_metrics: true,
                ..RalphConfig::default()
            },
            ..OrchestratorConfig::default()
        };
        let warnings = config.validate();
        assert!(warnings.contains(&ConfigWarning::DeferredFeature {
            field: "ralph.enable_metrics"
        }));
    }

    #[test]
    fn suppress_warnings_silences_advisories() {
        let mut config = OrchestratorConfig {
            suppress_warnings: true,
            ralph: RalphConfig {
                max_iterations: 500,
                ..RalphConfig::default()
            },
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_empty());
    }

    #[test]
    fn parses_nested_yaml() {
        let yaml = r#"
sessions_root: /tmp/sessions
ralph:
  max_iterations: 10
adapters:
  claude:
    command: claude
"#;
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ralph.max_iterations, 10);
        assert_eq!(
            config.adapter_settings("claude").command,
            Some("claude".to_string())
        );
    }
}
