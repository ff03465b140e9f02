//! Configuration file support for rigging.
//!
//! Rigging reads two configuration file locations:
//! - Global: `~/.rigging/config.toml` - user-wide defaults
//! - Project: `.rigging/config.toml` - project-specific overrides
//!
//! Project config takes precedence over global config. The file selects
//! the default profile and maps machine names to profiles, so a deploy
//! target can pick up its own default overrides without code changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the configured active profile.
pub const PROFILE_ENV_VAR: &str = "RIGGING_PROFILE";

/// Rigging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Profile selection settings
    pub profiles: ProfilesConfig,
}

/// Profile selection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// Name of the profile whose overrides merge into the base defaults
    pub default: Option<String>,

    /// Machine name to profile name, consulted at graph seal time
    #[serde(default)]
    pub machines: HashMap<String, String>,
}

impl ContainerConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Discover and merge configuration for a project root.
    ///
    /// Global config is loaded first, then the project config overrides it.
    pub fn discover(project_root: Option<&Path>) -> Self {
        let mut config = match Self::global_path() {
            Some(path) => Self::load_or_default(&path),
            None => Self::default(),
        };

        if let Some(root) = project_root {
            let project = Self::load_or_default(&root.join(".rigging").join("config.toml"));
            config.merge(project);
        }

        config
    }

    /// Path of the global config file, if a home directory exists.
    pub fn global_path() -> Option<PathBuf> {
        let base = directories::BaseDirs::new()?;
        Some(base.home_dir().join(".rigging").join("config.toml"))
    }

    /// Merge another config over this one (the other wins).
    pub fn merge(&mut self, over: ContainerConfig) {
        if over.profiles.default.is_some() {
            self.profiles.default = over.profiles.default;
        }
        for (machine, profile) in over.profiles.machines {
            self.profiles.machines.insert(machine, profile);
        }
    }

    /// The profile configured for this machine, if any.
    ///
    /// Matches the OS hostname against the `[profiles.machines]` table.
    pub fn machine_profile(&self) -> Option<String> {
        if self.profiles.machines.is_empty() {
            return None;
        }

        let name = hostname::get().ok()?;
        let name = name.to_string_lossy();
        self.profiles.machines.get(name.as_ref()).cloned()
    }

    /// The profile a new container should activate.
    ///
    /// `RIGGING_PROFILE` wins over the configured default.
    pub fn active_profile(&self) -> Option<String> {
        if let Ok(profile) = std::env::var(PROFILE_ENV_VAR) {
            if !profile.is_empty() {
                return Some(profile);
            }
        }
        self.profiles.default.clone()
    }
}
