//! Configuration loading and compiled defaults
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Steps 1 and 2 are handled by the binary's argument parser; this module
//! covers the TOML file and the compiled defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MAFL_CONFIG";

/// Logging section of the TOML config
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default log level filter (e.g. "info", "debug")
    pub level: Option<String>,
}

/// External tool names used to build commands
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Label resampling tool
    pub resample: Option<String>,
    /// Voxel-wise voting tool
    pub vote: Option<String>,
    /// Archive extraction tool for the template label cache
    pub extract: Option<String>,
}

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub registrations_dir: Option<PathBuf>,
    pub temp_root: Option<PathBuf>,
    pub template_labels: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub image_extension: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl TomlConfig {
    /// Parse a config file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Parse config text
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Config file to read: the explicit path, `$MAFL_CONFIG`, or the first
    /// existing platform location; `None` means compiled defaults only
    pub fn source(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        locate_platform_config()
    }
}

/// First existing platform config file, if any
///
/// Checks `<config_dir>/mafl/config.toml` then `/etc/mafl/config.toml`.
fn locate_platform_config() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mafl").join("config.toml"));
    if let Some(path) = user_config {
        if path.is_file() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/mafl/config.toml");
        if system_config.is_file() {
            return Some(system_config);
        }
    }

    None
}

/// Compiled defaults used when neither CLI, environment nor TOML supply a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_root: PathBuf,
    pub concurrency: usize,
    pub image_extension: String,
    pub log_level: String,
    pub resample_tool: String,
    pub vote_tool: String,
    pub extract_tool: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            temp_root: default_temp_root(),
            concurrency: 8,
            image_extension: "mnc".to_string(),
            log_level: "info".to_string(),
            resample_tool: "mincresample".to_string(),
            vote_tool: "voxel_vote.py".to_string(),
            extract_tool: "tar".to_string(),
        }
    }
}

/// Memory-backed `/dev/shm` when available, otherwise the OS temp dir
fn default_temp_root() -> PathBuf {
    let shm = PathBuf::from("/dev/shm");
    if shm.is_dir() {
        shm
    } else {
        std::env::temp_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = TomlConfig::parse(
            r#"
            input_dir = "/data/input"
            output_dir = "/data/output"
            concurrency = 16
            image_extension = "mnc"

            [logging]
            level = "debug"

            [tools]
            resample = "/opt/minc/bin/mincresample"
            "#,
        )
        .unwrap();

        assert_eq!(config.input_dir, Some(PathBuf::from("/data/input")));
        assert_eq!(config.concurrency, Some(16));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.tools.resample.as_deref(), Some("/opt/minc/bin/mincresample"));
        assert!(config.tools.vote.is_none());
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(TomlConfig::parse("").unwrap(), TomlConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(TomlConfig::parse("processes = 4").is_err());
    }

    #[test]
    fn test_compiled_defaults() {
        let defaults = CompiledDefaults::for_current_platform();
        assert_eq!(defaults.concurrency, 8);
        assert_eq!(defaults.image_extension, "mnc");
        assert_eq!(defaults.output_dir, PathBuf::from("output"));
        assert!(!defaults.temp_root.as_os_str().is_empty());
    }
}
