//! On-disk configuration for the forge multi-agent build engine.
//!
//! Mirrors the nested-struct-with-`#[serde(default)]` pattern used
//! throughout this codebase's sibling crates: every field is optional so a
//! missing or partial `forge.toml` still produces a fully usable `Config`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub workflow: WorkflowDefaults,
    #[serde(default)]
    pub test_runner: TestRunnerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A single named model endpoint definition, analogous to `ProviderDef` in
/// sibling crates but reduced to the one generic chat-completion contract
/// this engine's `AgentClient` speaks.
#[derive(Debug, Clone)]
pub struct ProviderDef {
    pub id: &'static str,
    pub env_var: &'static str,
    pub default_base_url: &'static str,
}

pub const BUILT_IN_PROVIDERS: &[ProviderDef] = &[
    ProviderDef {
        id: "openai",
        env_var: "OPENAI_API_KEY",
        default_base_url: "https://api.openai.com/v1",
    },
    ProviderDef {
        id: "anthropic",
        env_var: "ANTHROPIC_API_KEY",
        default_base_url: "https://api.anthropic.com/v1",
    },
    ProviderDef {
        id: "local",
        env_var: "FORGE_LOCAL_API_KEY",
        default_base_url: "http://localhost:11434/v1",
    },
];

pub fn find_provider_def(id: &str) -> Option<&'static ProviderDef> {
    BUILT_IN_PROVIDERS.iter().find(|p| p.id == id)
}

fn default_provider_id() -> String {
    "openai".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_id")]
    pub default: String,
    #[serde(default, flatten)]
    pub entries: HashMap<String, ProviderEntry>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default: default_provider_id(),
            entries: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    pub fn entry(&self, name: &str) -> Option<&ProviderEntry> {
        self.entries.get(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_min_iterations() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_max_review_rounds() -> u32 {
    2
}

fn default_completion_fraction() -> f64 {
    0.7
}

fn default_relevant_file_window() -> usize {
    20
}

/// Per-run toggles and defaults shared by the `IterationController`, the
/// `TddController`, and the CLI. The CLI's flags
/// override these when present; these are the fallback defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefaults {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_min_iterations")]
    pub min_iterations: u32,
    #[serde(default = "default_true")]
    pub stop_on_completion: bool,
    #[serde(default = "default_true")]
    pub testing_enabled: bool,
    #[serde(default = "default_true")]
    pub review_enabled: bool,
    #[serde(default = "default_max_review_rounds")]
    pub max_review_rounds: u32,
    #[serde(default = "default_true")]
    pub security_scan_enabled: bool,
    #[serde(default)]
    pub max_team_size: Option<usize>,
    #[serde(default = "default_completion_fraction")]
    pub completion_fraction: f64,
    #[serde(default = "default_relevant_file_window")]
    pub relevant_file_window: usize,
}

impl Default for WorkflowDefaults {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            min_iterations: default_min_iterations(),
            stop_on_completion: true,
            testing_enabled: true,
            review_enabled: true,
            max_review_rounds: default_max_review_rounds(),
            security_scan_enabled: true,
            max_team_size: None,
            completion_fraction: default_completion_fraction(),
            relevant_file_window: default_relevant_file_window(),
        }
    }
}

fn default_test_timeout_secs() -> u64 {
    300
}

fn default_output_cap_bytes() -> usize {
    100_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunnerConfig {
    #[serde(default = "default_test_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_output_cap_bytes")]
    pub output_cap_bytes: usize,
    #[serde(default)]
    pub custom_command: Option<String>,
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_test_timeout_secs(),
            output_cap_bytes: default_output_cap_bytes(),
            custom_command: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Loads the user-global config from `$XDG_CONFIG_HOME/forge/config.toml`
    /// (or platform equivalent), falling back to defaults if absent.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path).context("failed to read config file")?;
            toml::from_str(&content).context("failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("forge")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Optionally reads a `forge.toml` from the parent of a project's output
    /// directory, letting repeated runs in one output root share defaults
    /// without repeating CLI flags. The
    /// engine itself never writes this file.
    pub fn load_project(output_parent: &Path) -> Result<Option<Self>> {
        let path = output_parent.join("forge.toml");
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).context("failed to read project config")?;
        let config: Config = toml::from_str(&content).context("failed to parse project config")?;
        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.workflow.max_iterations, 3);
        assert_eq!(cfg.workflow.min_iterations, 2);
        assert!(cfg.workflow.stop_on_completion);
        assert_eq!(cfg.workflow.completion_fraction, 0.7);
        assert_eq!(cfg.test_runner.timeout_secs, 300);
    }

    #[test]
    fn parses_partial_toml() {
        let toml_str = r#"
            [workflow]
            max_iterations = 5
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.workflow.max_iterations, 5);
        assert_eq!(cfg.workflow.min_iterations, 2);
        assert_eq!(cfg.test_runner.timeout_secs, 300);
    }

    #[test]
    fn provider_def_lookup() {
        assert!(find_provider_def("anthropic").is_some());
        assert!(find_provider_def("nonexistent-vendor").is_none());
    }
}
