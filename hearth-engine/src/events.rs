//! ## hearth-engine::events
//! **Lifecycle and frame events fired by the application host**

use std::time::Duration;

use hearth_core::events::Event;

/// Fired once, after autoloaded plugins are installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppStarted;

impl Event for AppStarted {
    const TAG: &'static str = "hearth.app.started";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBegin {
    pub frame: u64,
}

impl Event for FrameBegin {
    const TAG: &'static str = "hearth.frame.begin";
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUpdate {
    pub frame: u64,
    /// Time since the previous frame began.
    pub delta: Duration,
}

impl Event for FrameUpdate {
    const TAG: &'static str = "hearth.frame.update";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEnd {
    pub frame: u64,
}

impl Event for FrameEnd {
    const TAG: &'static str = "hearth.frame.end";
}

/// Fired once, before plugins are uninstalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppStopping {
    pub frames: u64,
}

impl Event for AppStopping {
    const TAG: &'static str = "hearth.app.stopping";
}
