use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

use hearth_config::HearthConfig;
use hearth_core::alloc::MemoryManager;
use hearth_core::events::{AnyEvent, Event};
use hearth_engine::prelude::*;
use hearth_plugins::{export_plugin, Plugin, PluginContext, StaticLoader};
use hearth_telemetry::MetricsRecorder;

thread_local! {
    static SEEN: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn seen() -> Vec<String> {
    SEEN.with(|s| s.borrow().clone())
}

fn reset() {
    SEEN.with(|s| s.borrow_mut().clear());
}

fn note(entry: String) {
    SEEN.with(|s| s.borrow_mut().push(entry));
}

struct Echo;
impl Event for Echo {
    const TAG: &'static str = "tests.echo";
}

/// Subscribes to the frame events and posts an `Echo` on every update.
struct FrameWatcher {
    bus: Option<hearth_core::events::EventBus>,
}

impl Plugin for FrameWatcher {
    fn on_install(&mut self, ctx: &mut PluginContext<'_>) {
        ctx.subscribe::<AppStarted>();
        ctx.subscribe::<FrameUpdate>();
        ctx.subscribe::<Echo>();
        ctx.subscribe::<AppStopping>();
        self.bus = Some(ctx.bus().clone());
    }

    fn on_event(&self, event: &dyn AnyEvent) {
        if event.is::<AppStarted>() {
            note("started".into());
        } else if let Some(update) = event.downcast_ref::<FrameUpdate>() {
            note(format!("update {}", update.frame));
            if let Some(bus) = &self.bus {
                bus.post(Echo).unwrap();
            }
        } else if event.is::<Echo>() {
            note("echo".into());
        } else if let Some(stop) = event.downcast_ref::<AppStopping>() {
            note(format!("stopping after {}", stop.frames));
        }
    }

    fn on_uninstall(&mut self) {
        self.bus = None;
        note("uninstalled".into());
    }
}

export_plugin!(static watcher_create, watcher_destroy => FrameWatcher, |_, _| FrameWatcher { bus: None });

fn watcher_library(dir: &tempfile::TempDir, loader: &StaticLoader) -> PathBuf {
    let path = dir.path().join("libwatcher.so");
    std::fs::write(&path, b"").unwrap();
    loader.register(&path, watcher_create, watcher_destroy);
    path
}

#[test]
fn headless_run_drives_plugins_and_cleans_up() {
    reset();
    let dir = tempfile::tempdir().unwrap();
    let loader = StaticLoader::new();
    let path = watcher_library(&dir, &loader);
    let memory = Arc::new(MemoryManager::system());

    {
        let app = Application::builder(HearthConfig::default())
            .memory(memory.clone())
            .loader(loader.clone())
            .metrics(MetricsRecorder::new().unwrap())
            .plugin(&path)
            .build(HeadlessWindow::with_frame_limit(3));

        let result = app.run();
        assert_eq!(result, Ok(()));
        assert_eq!(LoopError::code_of(&result), 0);
        assert_eq!(app.frames(), 3);
        assert!(!app.window().is_open());
        assert!(app.plugins().is_empty());

        let metrics = app.metrics().unwrap();
        assert_eq!(metrics.frames.get(), 3);
        assert_eq!(metrics.plugins_loaded.get(), 0);
    }

    assert_eq!(
        seen(),
        vec![
            "started",
            "update 1",
            "echo",
            "update 2",
            "echo",
            "update 3",
            "echo",
            "stopping after 3",
            "uninstalled",
        ]
    );
    assert_eq!(loader.open_libraries(), 0);
    assert_eq!(memory.record_count(), 0);
}

#[test]
fn closed_window_reports_condition_false_but_still_tears_down() {
    reset();
    let dir = tempfile::tempdir().unwrap();
    let loader = StaticLoader::new();
    let path = watcher_library(&dir, &loader);

    let app = Application::builder(HearthConfig::default())
        .loader(loader.clone())
        .plugin(&path)
        .build(HeadlessWindow::with_frame_limit(0));

    let result = app.run();
    assert_eq!(result, Err(LoopError::ConditionFalse));
    assert_eq!(LoopError::code_of(&result), 2);
    assert_eq!(seen(), vec!["started", "stopping after 0", "uninstalled"]);
    assert_eq!(loader.open_libraries(), 0);
}

#[test]
fn frame_limit_from_config_stops_an_open_window() {
    reset();
    let mut config = HearthConfig::default();
    config.engine.max_frames = 5;

    let app = Application::builder(config).build(HeadlessWindow::new());
    app.run().unwrap();
    assert_eq!(app.frames(), 5);
    assert!(app.window().is_open());
}

#[test]
fn missing_autoload_is_not_fatal() {
    reset();
    let mut config = HearthConfig::default();
    config.plugins.autoload = vec![PathBuf::from("/no/such/libplugin.so")];
    config.engine.max_frames = 1;

    let app = Application::builder(config)
        .loader(StaticLoader::new())
        .build(HeadlessWindow::new());
    assert_eq!(app.run(), Ok(()));
    assert_eq!(app.frames(), 1);
}

#[test]
fn host_layers_run_as_subsystems() {
    reset();
    let app = Application::builder(HearthConfig::default()).build(HeadlessWindow::with_frame_limit(2));

    let layer = LoopSystem::named("gui");
    layer.set_enter_callback(|| note("gui enter".into()));
    layer.set_idle_callback(|| note("gui idle".into()));
    layer.set_exit_callback(|| note("gui exit".into()));
    app.root().add_subsystem(&layer).unwrap();

    app.run().unwrap();
    assert_eq!(
        seen(),
        vec!["gui enter", "gui idle", "gui idle", "gui exit"]
    );
    assert_eq!(app.run(), Err(LoopError::ConditionFalse));
}
