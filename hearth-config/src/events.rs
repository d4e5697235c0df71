//! Event bus settings.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct EventsConfig {
    /// Log at `warn` when an event is fired with no listener.
    #[serde(default)]
    pub warn_on_unhandled: bool,

    /// Rounds `process_events` drains before leaving events for the next call.
    #[serde(default = "default_drain_rounds")]
    #[validate(range(min = 1, max = 1024))]
    pub max_drain_rounds: usize,
}

fn default_drain_rounds() -> usize {
    16
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            warn_on_unhandled: false,
            max_drain_rounds: default_drain_rounds(),
        }
    }
}
