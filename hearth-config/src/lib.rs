//! # Hearth Configuration System
//!
//! Layered configuration for the hearth runtime.
//!
//! Hierarchy, later layers win:
//! 1. Default values
//! 2. `config/hearth.yaml`
//! 3. `config/<HEARTH_ENV>.yaml`
//! 4. `HEARTH_*` environment variables, `__` separating sections
//!    (`HEARTH_ENGINE__MAX_FRAMES=60`)

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod engine;
mod error;
mod events;
mod memory;
mod plugins;
mod telemetry;
mod validation;

pub use engine::EngineConfig;
pub use error::ConfigError;
pub use events::EventsConfig;
pub use memory::{FreePolicySetting, MemoryConfig};
pub use plugins::PluginsConfig;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/hearth.yaml";
const ENV_PREFIX: &str = "HEARTH_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct HearthConfig {
    #[validate(nested)]
    #[serde(default)]
    pub memory: MemoryConfig,

    #[validate(nested)]
    #[serde(default)]
    pub events: EventsConfig,

    #[validate(nested)]
    #[serde(default)]
    pub plugins: PluginsConfig,

    #[validate(nested)]
    #[serde(default)]
    pub engine: EngineConfig,

    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl HearthConfig {
    /// Load configuration from the default files and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(HearthConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        if let Ok(env) = std::env::var("HEARTH_ENV") {
            if env.is_empty() || env.contains(['/', '\\']) || env.contains("..") {
                return Err(ConfigError::InvalidEnvironment(env));
            }
            let env_file = format!("config/{env}.yaml");
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::finish(figment)
    }

    /// Load configuration from an explicit file, then the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }
        Self::finish(
            Figment::from(Serialized::defaults(HearthConfig::default())).merge(Yaml::file(path)),
        )
    }

    /// Parse a YAML document over the defaults, without the environment.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(HearthConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}
