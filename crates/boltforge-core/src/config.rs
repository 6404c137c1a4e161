// ABOUTME: Configuration loading and management for boltforge
// ABOUTME: Supports TOML config files with sensible defaults

use crate::action::DEFAULT_BINARY_EXTENSIONS;
use crate::build::BuildCommands;
use crate::runner::RunnerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Project directory actions run against
    pub workspace: Option<PathBuf>,
    pub runner: RunnerSection,
    pub shell: ShellSection,
    pub build: BuildSection,
    pub files: FilesSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerSection {
    /// Write file actions while their content is still streaming
    pub stream_file_writes: bool,
    /// Milliseconds the queue waits after launching a `start` action
    pub start_grace_ms: u64,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            stream_file_writes: true,
            start_grace_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellSection {
    /// Interpreter invoked as `<program> -c <command>`
    pub program: String,
    pub timeout_secs: u64,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            program: "sh".to_string(),
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildSection {
    pub command: String,
    pub contract_command: String,
    /// Files that must exist before a contract build runs
    pub contract_required_files: Vec<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        let defaults = BuildCommands::default();
        Self {
            command: defaults.build,
            contract_command: defaults.contract,
            contract_required_files: defaults.contract_required_files,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesSection {
    /// Extensions written as base64
    pub binary_extensions: Vec<String>,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            binary_extensions: DEFAULT_BINARY_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Get the XDG config directory for boltforge (~/.config/boltforge)
    pub fn config_dir() -> PathBuf {
        // Respect XDG_CONFIG_HOME if set, otherwise use ~/.config
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|p| p.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("boltforge")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load config from XDG config directory
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        Ok(config)
    }

    /// Get the workspace directory, defaulting to the current directory
    pub fn workspace_path(&self) -> PathBuf {
        self.workspace
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            stream_file_writes: self.runner.stream_file_writes,
            start_grace: Duration::from_millis(self.runner.start_grace_ms),
            binary_extensions: self.files.binary_extensions.clone(),
        }
    }

    pub fn build_commands(&self) -> BuildCommands {
        BuildCommands {
            build: self.build.command.clone(),
            contract: self.build.contract_command.clone(),
            contract_required_files: self.build.contract_required_files.clone(),
        }
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell.timeout_secs)
    }

    /// Generate a default config file content
    pub fn default_toml() -> String {
        r#"# boltforge configuration
# Location: ~/.config/boltforge/config.toml

# Project directory actions run against (defaults to the current directory)
# workspace = "/path/to/project"

[runner]
stream_file_writes = true
start_grace_ms = 2000

[shell]
program = "sh"
timeout_secs = 600

[build]
command = "npm run build"
contract_command = "npm run build:contract"
contract_required_files = ["package.json"]

[files]
# binary_extensions = ["png", "jpg", "wasm"]
"#
        .to_string()
    }

    /// Initialize config directory and create default config if needed
    pub fn init() -> Result<PathBuf> {
        Self::init_in(&Self::config_dir())
    }

    /// Create `config.toml` inside `config_dir` unless it already exists
    pub fn init_in(config_dir: &Path) -> Result<PathBuf> {
        let config_path = config_dir.join("config.toml");

        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

        if !config_path.exists() {
            std::fs::write(&config_path, Self::default_toml())
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_toml_parses_to_defaults() {
        let parsed: Config = toml::from_str(&Config::default_toml()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "workspace = \"/srv/app\"\n[shell]\ntimeout_secs = 5\n[runner]\nstream_file_writes = false\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.workspace_path(), PathBuf::from("/srv/app"));
        assert_eq!(config.shell.program, "sh");
        assert_eq!(config.shell_timeout(), Duration::from_secs(5));

        let runner = config.runner_config();
        assert!(!runner.stream_file_writes);
        assert_eq!(runner.start_grace, Duration::from_millis(2000));
        assert_eq!(config.build_commands(), BuildCommands::default());
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runner\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn init_in_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::init_in(dir.path()).unwrap();
        assert!(path.exists());

        std::fs::write(&path, "[shell]\ntimeout_secs = 1\n").unwrap();
        Config::init_in(dir.path()).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.shell.timeout_secs, 1);
    }
}
