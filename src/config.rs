//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/modeldom/modeldom.toml`
//! 3. Local config: file given with `--config`
//! 4. Environment variables: `MODELDOM_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;

/// Name uniqueness rules applied by the default node policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NamingConfig {
    /// Page names compare case-insensitively within a document
    pub page_names_case_insensitive: bool,
    /// Group names compare case-insensitively within a step
    pub group_names_case_insensitive: bool,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            page_names_case_insensitive: true,
            group_names_case_insensitive: false,
        }
    }
}

/// Event dispatch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventsConfig {
    /// Log every dispatched change at debug level instead of trace
    pub trace_dispatch: bool,
}

/// Raw naming config for intermediate parsing (`None` → not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawNamingConfig {
    pub page_names_case_insensitive: Option<bool>,
    pub group_names_case_insensitive: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawEventsConfig {
    pub trace_dispatch: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub naming: RawNamingConfig,
    pub events: RawEventsConfig,
}

/// Unified configuration for modeldom.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub naming: NamingConfig,
    pub events: EventsConfig,
}

/// Get the XDG config directory for modeldom.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "modeldom").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("modeldom.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    parse_raw_settings(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn parse_raw_settings(content: &str) -> Result<RawSettings, toml::de::Error> {
    toml::from_str(content)
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            naming: NamingConfig {
                page_names_case_insensitive: overlay
                    .naming
                    .page_names_case_insensitive
                    .unwrap_or(self.naming.page_names_case_insensitive),
                group_names_case_insensitive: overlay
                    .naming
                    .group_names_case_insensitive
                    .unwrap_or(self.naming.group_names_case_insensitive),
            },
            events: EventsConfig {
                trace_dispatch: overlay
                    .events
                    .trace_dispatch
                    .unwrap_or(self.events.trace_dispatch),
            },
        }
    }

    /// Parse settings from TOML text on top of the compiled defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ApplicationError> {
        let raw = parse_raw_settings(content).map_err(|e| ApplicationError::Config {
            message: format!("parse: {}", e),
        })?;
        Ok(Self::default().merge_with(&raw))
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_config` - Optional config file that overrides the global one
    pub fn load(local_config: Option<&Path>) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        // 3. Local config must exist when given explicitly
        if let Some(local) = local_config {
            let raw = load_raw_settings(local)?;
            current = current.merge_with(&raw);
        }

        // 4. Environment variables (explicit override)
        Self::apply_env_overrides(current)
    }

    /// Apply MODELDOM_* environment variables as explicit overrides.
    ///
    /// Sections are separated by a double underscore, e.g.
    /// `MODELDOM_NAMING__PAGE_NAMES_CASE_INSENSITIVE=false`.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("MODELDOM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_bool("naming.page_names_case_insensitive") {
            settings.naming.page_names_case_insensitive = val;
        }
        if let Ok(val) = config.get_bool("naming.group_names_case_insensitive") {
            settings.naming.group_names_case_insensitive = val;
        }
        if let Ok(val) = config.get_bool("events.trace_dispatch") {
            settings.events.trace_dispatch = val;
        }

        Ok(settings)
    }

    /// Render as TOML (for `config show`).
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize: {}", e),
        })
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
