//! ## hearth-engine::app
//! **Application host wiring allocator, bus, plugins and the main loop**
//!
//! The root loop system drives the window:
//! - enter: install autoloaded plugins, fire [`AppStarted`];
//! - idle: poll, fire frame events, drain posted events, present;
//! - exit: fire [`AppStopping`], uninstall every plugin.
//!
//! Hosts attach their own layers (GUI, scripting) as subsystems of
//! [`Application::root`].

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hearth_config::{FreePolicySetting, HearthConfig};
use hearth_core::alloc::{FreePolicy, MemoryManager};
use hearth_core::events::EventBus;
use hearth_plugins::{LibraryLoader, PluginManager, SymbolNames};
use hearth_telemetry::{EventLogger, MetricsRecorder};
use tracing::{debug, info, instrument, warn};

use crate::events::{AppStarted, AppStopping, FrameBegin, FrameEnd, FrameUpdate};
use crate::loop_system::{LoopError, LoopSystem};
use crate::window::Window;

/// Builds an [`Application`] from configuration plus host-supplied parts.
pub struct ApplicationBuilder {
    config: HearthConfig,
    memory: Option<Arc<MemoryManager>>,
    loader: Option<Box<dyn LibraryLoader>>,
    metrics: Option<MetricsRecorder>,
    plugins: Vec<PathBuf>,
}

impl ApplicationBuilder {
    /// Root allocator. Defaults to the system heap with the configured free policy.
    pub fn memory(mut self, memory: Arc<MemoryManager>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Library loader for plugins. Defaults to shared libraries on disk.
    pub fn loader(mut self, loader: impl LibraryLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Installs `path` on start, after the configured autoload list.
    pub fn plugin(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugins.push(path.into());
        self
    }

    pub fn build(self, window: impl Window + 'static) -> Application {
        let config = self.config;
        let memory = self.memory.unwrap_or_else(|| {
            let policy = match config.memory.free_policy {
                Some(FreePolicySetting::Panic) => FreePolicy::Panic,
                Some(FreePolicySetting::Ignore) => FreePolicy::Ignore,
                None => FreePolicy::default(),
            };
            Arc::new(MemoryManager::system().with_free_policy(policy))
        });

        let bus = EventBus::new(memory.clone());
        bus.set_drain_rounds(config.events.max_drain_rounds);
        bus.set_warn_on_unhandled(config.events.warn_on_unhandled);

        let mut manager = if config.memory.track_plugin_heap {
            PluginManager::new(bus.clone(), &memory)
        } else {
            PluginManager::with_memory(bus.clone(), memory.clone())
        }
        .with_symbols(SymbolNames::new(
            config.plugins.create_symbol.clone(),
            config.plugins.destroy_symbol.clone(),
        ));
        if let Some(loader) = self.loader {
            manager = manager.with_loader(loader);
        }

        let mut autoload = config.plugins.autoload.clone();
        autoload.extend(self.plugins);

        let app = Application {
            root: LoopSystem::named("app"),
            memory,
            bus,
            plugins: Rc::new(RefCell::new(manager)),
            window: Rc::new(RefCell::new(window)),
            frames: Rc::new(Cell::new(0)),
            metrics: self.metrics,
            autoload,
            config,
        };
        app.wire();
        app
    }
}

/// A headless-capable application host.
pub struct Application {
    config: HearthConfig,
    memory: Arc<MemoryManager>,
    bus: EventBus,
    plugins: Rc<RefCell<PluginManager>>,
    window: Rc<RefCell<dyn Window>>,
    root: LoopSystem,
    frames: Rc<Cell<u64>>,
    metrics: Option<MetricsRecorder>,
    autoload: Vec<PathBuf>,
}

impl Application {
    pub fn builder(config: HearthConfig) -> ApplicationBuilder {
        ApplicationBuilder {
            config,
            memory: None,
            loader: None,
            metrics: None,
            plugins: Vec::new(),
        }
    }

    fn wire(&self) {
        self.wire_enter();
        self.wire_idle();
        self.wire_exit();

        let window = self.window.clone();
        let frames = self.frames.clone();
        let max_frames = self.config.engine.max_frames;
        self.root.set_loop_condition(move || {
            window.borrow().is_open() && (max_frames == 0 || frames.get() < max_frames)
        });
    }

    fn wire_enter(&self) {
        let plugins = self.plugins.clone();
        let bus = self.bus.clone();
        let metrics = self.metrics.clone();
        let autoload = self.autoload.clone();
        self.root.set_enter_callback(move || {
            EventLogger::lifecycle("app", "enter");
            let mut manager = plugins.borrow_mut();
            for path in &autoload {
                match manager.install(path, std::ptr::null_mut()) {
                    Ok(id) => debug!(plugin = %id, path = %path.display(), "autoloaded"),
                    Err(e) => warn!(path = %path.display(), "Failed to install plugin: {e}"),
                }
            }
            if let Some(metrics) = &metrics {
                metrics.set_plugins_loaded(manager.len());
            }
            info!(plugins = manager.len(), "application started");
            drop(manager);
            bus.fire(&AppStarted);
        });
    }

    fn wire_idle(&self) {
        let window = self.window.clone();
        let bus = self.bus.clone();
        let memory = self.memory.clone();
        let frames = self.frames.clone();
        let metrics = self.metrics.clone();
        let budget = Duration::from_millis(self.config.engine.frame_budget_ms);
        let mut previous: Option<Instant> = None;
        self.root.set_idle_callback(move || {
            let started = Instant::now();
            let delta = previous.map_or(Duration::ZERO, |p| started.duration_since(p));
            previous = Some(started);

            window.borrow_mut().poll_events();
            let frame = frames.get() + 1;
            frames.set(frame);

            bus.fire(&FrameBegin { frame });
            bus.fire(&FrameUpdate { frame, delta });
            bus.process_events();
            bus.fire(&FrameEnd { frame });
            window.borrow_mut().swap_buffers();

            let elapsed = started.elapsed();
            if let Some(metrics) = &metrics {
                metrics.observe_frame(elapsed.as_secs_f64());
                metrics.observe_events(bus.fired_count());
                metrics.observe_memory(&memory.stats());
            }
            if elapsed < budget {
                std::thread::sleep(budget - elapsed);
            }
        });
    }

    fn wire_exit(&self) {
        let plugins = self.plugins.clone();
        let bus = self.bus.clone();
        let memory = self.memory.clone();
        let frames = self.frames.clone();
        let metrics = self.metrics.clone();
        self.root.set_exit_callback(move || {
            bus.fire(&AppStopping {
                frames: frames.get(),
            });
            bus.process_events();
            let unloaded = plugins.borrow_mut().uninstall_all();
            let dropped = bus.clear_pending();
            if dropped > 0 {
                debug!(dropped, "discarded events posted during shutdown");
            }
            if let Some(metrics) = &metrics {
                metrics.set_plugins_loaded(0);
                metrics.observe_events(bus.fired_count());
                metrics.observe_memory(&memory.stats());
            }
            info!(unloaded, frames = frames.get(), "application stopped");
            EventLogger::lifecycle("app", "exit");
        });
    }

    /// Runs the main loop until the window closes or the frame limit is hit.
    #[instrument(skip(self), name = "app_run")]
    pub fn run(&self) -> Result<(), LoopError> {
        self.root.run()
    }

    /// Root loop system; attach host layers as its subsystems.
    pub fn root(&self) -> &LoopSystem {
        &self.root
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn plugins(&self) -> Ref<'_, PluginManager> {
        self.plugins.borrow()
    }

    pub fn plugins_mut(&self) -> RefMut<'_, PluginManager> {
        self.plugins.borrow_mut()
    }

    pub fn window(&self) -> Ref<'_, dyn Window> {
        self.window.borrow()
    }

    /// Completed frames.
    pub fn frames(&self) -> u64 {
        self.frames.get()
    }

    pub fn metrics(&self) -> Option<&MetricsRecorder> {
        self.metrics.as_ref()
    }

    pub fn config(&self) -> &HearthConfig {
        &self.config
    }
}
