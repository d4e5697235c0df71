//! ## hearth-plugins::plugin
//! **What a plugin implements, and what it sees while installing**

use std::rc::Rc;
use std::sync::Arc;

use hearth_core::alloc::MemoryManager;
use hearth_core::events::{AnyEvent, Event, EventBus, EventListener, Listener};

use crate::details::PluginDetails;
use crate::manager::PluginSlot;

/// A live plugin object.
///
/// Every callback runs on the host thread. A plugin receives events sent by
/// the manager directly and events it subscribed to on the bus.
///
/// `on_event` takes `&self` because delivery nests: a plugin that fires an
/// event it subscribed to receives it before its current `on_event` returns.
/// Keep per-event state in `Cell`/`RefCell`. Install and uninstall have
/// exclusive access; events reaching the plugin during them are skipped.
pub trait Plugin: 'static {
    /// Called once, right after the instance is created.
    fn on_install(&mut self, _ctx: &mut PluginContext<'_>) {}

    fn on_event(&self, event: &dyn AnyEvent);

    /// Called once, before the instance is destroyed.
    fn on_uninstall(&mut self) {}
}

/// Forwards bus events to the plugin that owns it.
pub struct PluginRelay {
    pub(crate) slot: Rc<PluginSlot>,
}

impl EventListener for PluginRelay {
    fn on_event(&self, event: &dyn AnyEvent) {
        self.slot.with_shared(|plugin| plugin.on_event(event));
    }
}

/// Handed to [`Plugin::on_install`].
///
/// Subscriptions made here belong to the plugin's relay listener and end
/// when the plugin is uninstalled.
pub struct PluginContext<'a> {
    pub(crate) details: &'a PluginDetails,
    pub(crate) bus: &'a EventBus,
    pub(crate) relay: &'a Listener<PluginRelay>,
    pub(crate) memory: &'a Arc<MemoryManager>,
}

impl PluginContext<'_> {
    pub fn details(&self) -> &PluginDetails {
        self.details
    }

    /// Routes `E` fired on the host bus to this plugin.
    pub fn subscribe<E: Event>(&mut self) -> bool {
        self.bus.subscribe::<E, _>(self.relay)
    }

    pub fn unsubscribe<E: Event>(&mut self) -> bool {
        self.bus.unsubscribe::<E, _>(self.relay)
    }

    /// The host bus, e.g. to keep a handle for posting later.
    pub fn bus(&self) -> &EventBus {
        self.bus
    }

    /// The plugin heap.
    pub fn memory(&self) -> &Arc<MemoryManager> {
        self.memory
    }
}
