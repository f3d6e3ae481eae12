//! Configuration file management for quietrun.
//!
//! Provides a TOML-based config file at `~/.config/quietrun/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use quietrun_core::RuleTable;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub rules: RulesSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OutputSection {
    /// Forward child output unchanged instead of classifying it.
    #[serde(default)]
    pub verbose: bool,
    /// Style progress lines with ANSI colors.
    #[serde(default)]
    pub color: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RulesSection {
    /// Rule table to use instead of the built-in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the quietrun config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/quietrun` or
/// `~/.config/quietrun`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("quietrun");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("quietrun")
}

/// Return the path to the quietrun config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Settings given on the command line. `false` / `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub verbose: bool,
    pub color: bool,
    pub rules: Option<PathBuf>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuietrunConfig {
    pub verbose: bool,
    pub color: bool,
    /// `None` selects the built-in deployment rules.
    pub rules_path: Option<PathBuf>,
}

impl QuietrunConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Verbose: `--verbose` > `QUIETRUN_VERBOSE` > `output.verbose` > `false`
    /// - Color: `--color` > `NO_COLOR` (forces off) > `QUIETRUN_COLOR` > `output.color` > `false`
    /// - Rules: `--rules` > `QUIETRUN_RULES` > `rules.path` > built-in table
    ///
    /// A missing config file is not an error; a malformed one is.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let path = config_path();
        let file_config = if path.exists() {
            Some(load_config()?)
        } else {
            None
        };

        let verbose = if cli.verbose {
            true
        } else if let Some(v) = env_flag("QUIETRUN_VERBOSE")? {
            v
        } else if let Some(ref cfg) = file_config {
            cfg.output.verbose
        } else {
            false
        };

        let color = if cli.color {
            true
        } else if std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            false
        } else if let Some(v) = env_flag("QUIETRUN_COLOR")? {
            v
        } else if let Some(ref cfg) = file_config {
            cfg.output.color
        } else {
            false
        };

        let rules_path = if let Some(ref p) = cli.rules {
            Some(p.clone())
        } else if let Some(p) = std::env::var_os("QUIETRUN_RULES").filter(|v| !v.is_empty()) {
            Some(PathBuf::from(p))
        } else {
            file_config.and_then(|cfg| cfg.rules.path)
        };

        Ok(Self {
            verbose,
            color,
            rules_path,
        })
    }

    /// Load the effective rule table.
    pub fn load_rules(&self) -> Result<RuleTable> {
        load_rules(self.rules_path.as_deref())
    }

    /// Human-readable origin of the rule table.
    pub fn rules_source(&self) -> String {
        match &self.rules_path {
            Some(p) => p.display().to_string(),
            None => "built-in deployment rules".to_string(),
        }
    }
}

/// Load rules from `path`, or the built-in table when `None`.
pub fn load_rules(path: Option<&Path>) -> Result<RuleTable> {
    match path {
        Some(p) => RuleTable::load(p)
            .with_context(|| format!("failed to load rule table from {}", p.display())),
        None => Ok(RuleTable::deploy()),
    }
}

/// Read a boolean environment variable. Unset or empty means `None`.
fn env_flag(name: &str) -> Result<Option<bool>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => bail!("{name} must be a boolean (1/0, true/false, yes/no, on/off), got {raw:?}"),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
