//! Allocator settings.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// What the allocator does on a double or foreign free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreePolicySetting {
    Panic,
    Ignore,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct MemoryConfig {
    /// Unset means the build default: panic in debug, ignore in release.
    #[serde(default)]
    pub free_policy: Option<FreePolicySetting>,

    /// Give plugins their own record table scoped under the root allocator.
    #[serde(default = "default_true")]
    pub track_plugin_heap: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            free_policy: None,
            track_plugin_heap: default_true(),
        }
    }
}
