//! Main loop settings.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, Default)]
pub struct EngineConfig {
    /// Stop after this many frames; 0 runs until the window closes.
    #[serde(default)]
    pub max_frames: u64,

    /// Minimum frame duration in milliseconds; 0 runs unthrottled.
    #[serde(default)]
    #[validate(range(max = 1000))]
    pub frame_budget_ms: u64,
}
