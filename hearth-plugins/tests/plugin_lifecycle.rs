use std::cell::RefCell;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use hearth_core::alloc::{FreePolicy, MemoryManager};
use hearth_core::events::{AnyEvent, Event, EventBus};
use hearth_plugins::{
    export_plugin, Plugin, PluginContext, PluginError, PluginInstance, PluginManager, StaticLoader,
    StaticSymbol, DEFAULT_CREATE_SYMBOL,
};
use tempfile::TempDir;

struct Ping(u32);
impl Event for Ping {
    const TAG: &'static str = "tests.ping";
}

struct Direct;
impl Event for Direct {
    const TAG: &'static str = "tests.direct";
}

struct Echo;
impl Event for Echo {
    const TAG: &'static str = "tests.echo";
}

type Log = Rc<RefCell<Vec<String>>>;

fn log_from(userptr: *mut c_void) -> Log {
    // SAFETY: every test passes a pointer to a live `Log` (or null).
    unsafe { (userptr as *const Log).as_ref() }
        .cloned()
        .unwrap_or_default()
}

struct Recorder {
    name: &'static str,
    log: Log,
}

impl Recorder {
    fn attach(name: &'static str, userptr: *mut c_void) -> Self {
        Recorder {
            name,
            log: log_from(userptr),
        }
    }

    fn push(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }
}

impl Plugin for Recorder {
    fn on_install(&mut self, ctx: &mut PluginContext<'_>) {
        assert!(ctx.subscribe::<Ping>());
        assert!(!ctx.subscribe::<Ping>());
        self.push(format!("install {}", self.name));
    }

    fn on_event(&self, event: &dyn AnyEvent) {
        if let Some(ping) = event.downcast_ref::<Ping>() {
            self.push(format!("{} ping {}", self.name, ping.0));
        } else if event.is::<Direct>() {
            self.push(format!("{} direct", self.name));
        }
    }

    fn on_uninstall(&mut self) {
        self.push(format!("uninstall {}", self.name));
    }
}

export_plugin!(static alpha_create, alpha_destroy => Recorder, |_, userptr| Recorder::attach("alpha", userptr));
export_plugin!(static beta_create, beta_destroy => Recorder, |_, userptr| Recorder::attach("beta", userptr));
export_plugin!(static gamma_create, gamma_destroy => Recorder, |_, userptr| Recorder::attach("gamma", userptr));

/// Fires `Echo` on the bus while handling `Ping`; subscribed to both.
struct Echoer {
    bus: Option<EventBus>,
    log: Log,
}

impl Plugin for Echoer {
    fn on_install(&mut self, ctx: &mut PluginContext<'_>) {
        ctx.subscribe::<Ping>();
        ctx.subscribe::<Echo>();
        self.bus = Some(ctx.bus().clone());
    }

    fn on_event(&self, event: &dyn AnyEvent) {
        if let Some(ping) = event.downcast_ref::<Ping>() {
            self.log.borrow_mut().push(format!("echoer ping {}", ping.0));
            if let Some(bus) = &self.bus {
                bus.fire(&Echo);
            }
            self.log.borrow_mut().push("echoer ping done".into());
        } else if event.is::<Echo>() {
            self.log.borrow_mut().push("echoer echo".into());
        }
    }

    fn on_uninstall(&mut self) {
        self.bus = None;
    }
}

export_plugin!(static echoer_create, echoer_destroy => Echoer, |_, userptr| Echoer {
    bus: None,
    log: log_from(userptr),
});

/// Subscribes, then fails halfway through installing.
struct Fragile;

impl Plugin for Fragile {
    fn on_install(&mut self, ctx: &mut PluginContext<'_>) {
        ctx.subscribe::<Ping>();
        panic!("install hook failed");
    }

    fn on_event(&self, _event: &dyn AnyEvent) {}
}

export_plugin!(static fragile_create, fragile_destroy => Fragile, |_, _| Fragile);

extern "C" fn null_create(_: *mut PluginManager, _: *mut c_void) -> *mut PluginInstance {
    std::ptr::null_mut()
}

struct Fixture {
    dir: TempDir,
    loader: StaticLoader,
    memory: Arc<MemoryManager>,
    bus: EventBus,
    log: Log,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let loader = StaticLoader::new();
        let memory = Arc::new(MemoryManager::system());
        let bus = EventBus::new(memory.clone());
        let fixture = Fixture {
            dir,
            loader,
            memory,
            bus,
            log: Log::default(),
        };
        fixture.register("libalpha.so", alpha_create, alpha_destroy);
        fixture.register("libbeta.so", beta_create, beta_destroy);
        fixture.register("libgamma.so", gamma_create, gamma_destroy);
        fixture
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn touch(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    fn register(
        &self,
        name: &str,
        create: hearth_plugins::CreateFn,
        destroy: hearth_plugins::DestroyFn,
    ) -> PathBuf {
        let path = self.touch(name);
        self.loader.register(&path, create, destroy);
        path
    }

    fn manager(&self) -> PluginManager {
        PluginManager::new(self.bus.clone(), &self.memory).with_loader(self.loader.clone())
    }

    fn userptr(&self) -> *mut c_void {
        &self.log as *const Log as *mut c_void
    }

    fn install(&self, manager: &mut PluginManager, name: &str) -> hearth_plugins::PluginId {
        manager.install(self.path(name), self.userptr()).unwrap()
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}

#[test]
fn end_to_end_ping_reaches_plugin_and_memory_returns_to_zero() {
    let fx = Fixture::new();
    {
        let mut manager = fx.manager();
        let id = fx.install(&mut manager, "libalpha.so");
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.details(id).unwrap().name, "alpha");
        assert_eq!(fx.bus.listener_count::<Ping>(), 1);
        // Instance and plugin object, both recorded by the parent allocator.
        assert_eq!(fx.memory.record_count(), 2);

        assert_eq!(fx.bus.fire(&Ping(7)), 1);
        fx.bus.post(Ping(8)).unwrap();
        assert_eq!(fx.bus.process_events(), 1);

        assert!(manager.uninstall(id));
        assert_eq!(fx.bus.listener_count::<Ping>(), 0);
        assert_eq!(fx.bus.fire(&Ping(9)), 0);
        assert!(manager.is_empty());
    }
    assert_eq!(
        fx.take_log(),
        vec!["install alpha", "alpha ping 7", "alpha ping 8", "uninstall alpha"]
    );
    assert_eq!(fx.loader.open_libraries(), 0);
    assert_eq!(fx.memory.record_count(), 0);
}

#[test]
fn install_is_idempotent_per_canonical_path() {
    let fx = Fixture::new();
    let mut manager = fx.manager();

    let first = fx.install(&mut manager, "libalpha.so");
    let dotted = fx.dir.path().join(".").join("libalpha.so");
    let second = manager.install(&dotted, fx.userptr()).unwrap();

    assert_eq!(first, second);
    assert_eq!(manager.len(), 1);
    assert_eq!(fx.loader.opens(), 1);
    assert_eq!(fx.bus.listener_count::<Ping>(), 1);
}

#[test]
fn uninstall_all_is_lifo() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    for name in ["libalpha.so", "libbeta.so", "libgamma.so"] {
        fx.install(&mut manager, name);
    }
    fx.take_log();

    assert_eq!(manager.uninstall_all(), 3);
    assert_eq!(
        fx.take_log(),
        vec!["uninstall gamma", "uninstall beta", "uninstall alpha"]
    );
    assert_eq!(fx.loader.open_libraries(), 0);
    assert_eq!(manager.uninstall_all(), 0);
}

#[test]
fn dropping_the_manager_unloads_everything() {
    let fx = Fixture::new();
    {
        let mut manager = fx.manager();
        fx.install(&mut manager, "libalpha.so");
        fx.install(&mut manager, "libbeta.so");
        fx.take_log();
    }
    assert_eq!(fx.take_log(), vec!["uninstall beta", "uninstall alpha"]);
    assert_eq!(fx.bus.category_count(), 0);
    assert_eq!(fx.memory.record_count(), 0);
}

#[test]
fn direct_delivery_targets_one_plugin() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    fx.install(&mut manager, "libalpha.so");
    let beta = fx.install(&mut manager, "libbeta.so");
    fx.take_log();

    assert!(manager.send(&Direct, beta));
    assert!(manager.send_at(&Direct, 0));
    assert!(!manager.send_at(&Direct, 2));
    assert_eq!(manager.fire(&Direct), 2);
    assert_eq!(
        fx.take_log(),
        vec!["beta direct", "alpha direct", "alpha direct", "beta direct"]
    );

    assert!(manager.uninstall(beta));
    assert!(!manager.uninstall(beta));
    assert!(!manager.send(&Direct, beta));
    assert_eq!(manager.ids().count(), 1);
}

#[test]
fn bus_delivery_follows_install_order() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    fx.install(&mut manager, "libbeta.so");
    fx.install(&mut manager, "libalpha.so");
    fx.take_log();

    fx.bus.fire(&Ping(1));
    assert_eq!(fx.take_log(), vec!["beta ping 1", "alpha ping 1"]);
}

fn assert_unchanged(fx: &Fixture, manager: &PluginManager, loaded: usize) {
    assert_eq!(manager.len(), loaded);
    assert_eq!(fx.loader.open_libraries(), loaded);
    assert_eq!(fx.bus.listener_count::<Ping>(), loaded);
}

#[test]
fn failed_installs_leave_the_set_unchanged() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    fx.install(&mut manager, "libalpha.so");
    let records_before = fx.memory.record_count();

    let missing = manager.install(fx.path("libmissing.so"), fx.userptr());
    assert!(matches!(missing, Err(PluginError::InvalidPath { .. })));
    assert_unchanged(&fx, &manager, 1);

    let unregistered = fx.touch("libunregistered.so");
    let open = manager.install(&unregistered, fx.userptr());
    assert!(matches!(open, Err(PluginError::Open { .. })));
    assert_unchanged(&fx, &manager, 1);

    let half = fx.touch("libhalf.so");
    fx.loader
        .register_symbol(&half, DEFAULT_CREATE_SYMBOL, StaticSymbol::Create(alpha_create));
    let symbol = manager.install(&half, fx.userptr());
    assert!(matches!(symbol, Err(PluginError::MissingSymbol { .. })));
    assert_unchanged(&fx, &manager, 1);

    let null = fx.register("libnull.so", null_create, alpha_destroy);
    let create = manager.install(&null, fx.userptr());
    assert!(matches!(create, Err(PluginError::CreateFailed { .. })));
    assert_unchanged(&fx, &manager, 1);

    assert_eq!(fx.memory.record_count(), records_before);
}

#[test]
fn custom_symbol_names_are_honored() {
    let fx = Fixture::new();
    let path = fx.touch("librenamed.so");
    fx.loader
        .register_symbol(&path, "make", StaticSymbol::Create(gamma_create));
    fx.loader
        .register_symbol(&path, "unmake", StaticSymbol::Destroy(gamma_destroy));

    let mut default_names = fx.manager();
    assert!(default_names.install(&path, fx.userptr()).is_err());

    let mut renamed = fx
        .manager()
        .with_symbols(hearth_plugins::SymbolNames::new("make", "unmake"));
    let id = renamed.install(&path, fx.userptr()).unwrap();
    assert!(renamed.contains(id));
    assert_eq!(renamed.details(id).unwrap().path, path.canonicalize().unwrap());
}

#[test]
fn plugin_paths_are_canonical() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    let id = fx.install(&mut manager, "libalpha.so");
    let details = manager.details(id).unwrap();
    assert!(details.path.is_absolute());
    assert_eq!(details.ext, "so");
    assert_eq!(
        Path::new(&details.path).file_name().unwrap(),
        "libalpha.so"
    );
}

#[test]
fn plugin_receives_events_it_fires_while_handling_another() {
    let fx = Fixture::new();
    fx.register("libechoer.so", echoer_create, echoer_destroy);
    let mut manager = fx.manager();
    fx.install(&mut manager, "libechoer.so");
    fx.install(&mut manager, "libalpha.so");
    fx.take_log();

    assert_eq!(fx.bus.fire(&Ping(1)), 2);
    assert_eq!(
        fx.take_log(),
        vec!["echoer ping 1", "echoer echo", "echoer ping done", "alpha ping 1"]
    );
}

#[test]
fn panicking_install_destroys_the_instance_and_closes_the_library() {
    let fx = Fixture::new();
    let fragile = fx.register("libfragile.so", fragile_create, fragile_destroy);
    let mut manager = fx.manager();
    fx.install(&mut manager, "libalpha.so");
    let records_before = fx.memory.record_count();

    let outcome = catch_unwind(AssertUnwindSafe(|| manager.install(&fragile, fx.userptr())));
    assert!(outcome.is_err());
    assert_unchanged(&fx, &manager, 1);
    assert_eq!(fx.memory.record_count(), records_before);
    assert_eq!(fx.loader.opens(), 2);

    assert_eq!(manager.uninstall_all(), 1);
    assert_eq!(fx.loader.open_libraries(), 0);
}

#[test]
#[tracing_test::traced_test]
fn destroy_symbol_logs_a_rejected_instance() {
    let memory = Arc::new(MemoryManager::system().with_free_policy(FreePolicy::Ignore));
    let mut manager = PluginManager::with_memory(EventBus::new(memory.clone()), memory.clone());
    let mut foreign = 0u64;

    alpha_destroy(&mut manager, (&mut foreign as *mut u64).cast());
    assert!(logs_contain("Failed to destroy plugin instance"));
    assert_eq!(foreign, 0);
    assert_eq!(memory.record_count(), 0);
}
