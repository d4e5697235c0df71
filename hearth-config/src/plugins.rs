//! Plugin loading settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct PluginsConfig {
    #[serde(default = "default_create_symbol")]
    #[validate(custom(function = validation::validate_c_identifier))]
    pub create_symbol: String,

    #[serde(default = "default_destroy_symbol")]
    #[validate(custom(function = validation::validate_c_identifier))]
    pub destroy_symbol: String,

    /// Libraries installed when the application starts, in order.
    #[serde(default)]
    #[validate(custom(function = validation::validate_plugin_paths))]
    pub autoload: Vec<PathBuf>,
}

fn default_create_symbol() -> String {
    "hearth_plugin_create".into()
}

fn default_destroy_symbol() -> String {
    "hearth_plugin_destroy".into()
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            create_symbol: default_create_symbol(),
            destroy_symbol: default_destroy_symbol(),
            autoload: Vec::new(),
        }
    }
}
