//! Configuration management with YAML persistence

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker launch settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// UI preferences
    #[serde(default)]
    pub ui: UiPreferences,
}

/// How the worker process is launched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Executable to spawn
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the per-run arguments (usually the script path)
    #[serde(default = "default_base_args")]
    pub base_args: Vec<String>,

    /// Per-run arguments used when none are given on the command line
    #[serde(default)]
    pub default_args: Vec<String>,

    /// Environment variables whose values are appended as arguments
    #[serde(default)]
    pub arg_env: Vec<String>,

    /// Extra variables for the worker. Applied after the unbuffered UTF-8
    /// settings the supervisor always passes, so they can override them.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory for the worker
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Start the worker as soon as the console opens
    #[serde(default)]
    pub auto_start: bool,
}

/// UI preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiPreferences {
    /// Auto-scroll output panes
    #[serde(default = "default_true")]
    pub auto_scroll: bool,

    /// Show timestamps in output panes
    #[serde(default)]
    pub show_timestamps: bool,

    /// Maximum lines kept per output pane
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,

    /// Use ASCII icons for terminals without Unicode symbols
    #[serde(default)]
    pub ascii_icons: bool,

    /// Color theme
    #[serde(default)]
    pub theme: Theme,
}

/// Color theme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_buffer_size() -> usize {
    10000
}

fn default_program() -> String {
    if cfg!(windows) {
        "py".to_string()
    } else {
        "python3".to_string()
    }
}

fn default_base_args() -> Vec<String> {
    vec!["python/main.py".to_string()]
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            base_args: default_base_args(),
            default_args: Vec::new(),
            arg_env: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            auto_start: false,
        }
    }
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            auto_scroll: true,
            show_timestamps: false,
            log_buffer_size: default_log_buffer_size(),
            ascii_icons: false,
            theme: Theme::Dark,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scriptvisor")
            .join("config.yaml")
    }

    /// Load configuration from file
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(Self::default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<PathBuf>) -> Result<()> {
        let path = path.unwrap_or_else(Self::default_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }
}

impl WorkerConfig {
    /// Values of the `arg_env` variables, skipping unset ones
    pub fn env_args(&self) -> Vec<String> {
        self.arg_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .collect()
    }
}
