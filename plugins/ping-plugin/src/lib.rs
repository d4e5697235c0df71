//! Sample plugin: counts frames and answers every `interval`-th update with
//! a deferred [`Ping`].

use std::cell::Cell;

use hearth_core::events::{AnyEvent, Event, EventBus};
use hearth_engine::events::{AppStarted, AppStopping, FrameUpdate};
use hearth_plugins::{export_plugin, Plugin, PluginContext};
use tracing::info;

/// Posted by the plugin every `interval` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub sequence: u64,
    pub frame: u64,
}

impl Event for Ping {
    const TAG: &'static str = "ping_plugin.ping";
}

pub const DEFAULT_INTERVAL: u64 = 60;

pub struct PingPlugin {
    interval: u64,
    frames: Cell<u64>,
    sent: Cell<u64>,
    bus: Option<EventBus>,
}

impl PingPlugin {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            frames: Cell::new(0),
            sent: Cell::new(0),
            bus: None,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.get()
    }

    pub fn sent(&self) -> u64 {
        self.sent.get()
    }
}

impl Plugin for PingPlugin {
    fn on_install(&mut self, ctx: &mut PluginContext<'_>) {
        ctx.subscribe::<AppStarted>();
        ctx.subscribe::<FrameUpdate>();
        ctx.subscribe::<AppStopping>();
        self.bus = Some(ctx.bus().clone());
        info!(plugin = %ctx.details().id, interval = self.interval, "ping plugin installed");
    }

    fn on_event(&self, event: &dyn AnyEvent) {
        if let Some(update) = event.downcast_ref::<FrameUpdate>() {
            self.frames.set(self.frames.get() + 1);
            if update.frame % self.interval == 0 {
                if let Some(bus) = &self.bus {
                    self.sent.set(self.sent.get() + 1);
                    let ping = Ping {
                        sequence: self.sent.get(),
                        frame: update.frame,
                    };
                    if let Err(e) = bus.post(ping) {
                        tracing::warn!("Failed to post ping: {e}");
                    }
                }
            }
        } else if event.is::<AppStarted>() {
            info!("ping plugin sees the application start");
        } else if let Some(stop) = event.downcast_ref::<AppStopping>() {
            info!(frames = stop.frames, seen = self.frames(), sent = self.sent(), "ping plugin stopping");
        }
    }

    fn on_uninstall(&mut self) {
        self.bus = None;
    }
}

export_plugin!(PingPlugin, |_, _| PingPlugin::new(DEFAULT_INTERVAL));
