//! ## hearth-plugins::manager
//! **Loads, owns and unloads plugin libraries**
//!
//! Each loaded plugin is one record in a batch vector kept in install order,
//! indexed by [`PluginId`]. A record owns a `LoadedPlugin`: the instance
//! together with the library its code lives in. Dropping it destroys the
//! instance through the library's `destroy` and then closes the library, so
//! an install that fails or unwinds after `create` still cleans up. The
//! instance lives in the manager's plugin heap and is only ever created and
//! destroyed through it.

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

use hearth_core::alloc::{AllocError, MemoryManager};
use hearth_core::events::{AnyEvent, EventBus, Listener};
use tracing::{debug, error, info, instrument, warn};

use crate::details::{PluginDetails, PluginId};
use crate::error::PluginError;
use crate::installer::{PluginInstaller, PluginInstance, SymbolNames};
use crate::loader::{DynamicLoader, LibraryLoader, PluginLibrary};
use crate::plugin::{Plugin, PluginContext, PluginRelay};

/// Access point to a plugin instance.
///
/// Event delivery borrows the plugin shared and may nest. Install and
/// uninstall borrow it exclusively and are refused while any delivery is in
/// flight.
pub(crate) struct PluginSlot {
    instance: Cell<Option<NonNull<PluginInstance>>>,
    readers: Cell<usize>,
    exclusive: Cell<bool>,
}

impl PluginSlot {
    fn new(instance: NonNull<PluginInstance>) -> Self {
        Self {
            instance: Cell::new(Some(instance)),
            readers: Cell::new(0),
            exclusive: Cell::new(false),
        }
    }

    pub(crate) fn with_shared<R>(&self, f: impl FnOnce(&dyn Plugin) -> R) -> Option<R> {
        if self.exclusive.get() {
            warn!("event reached a plugin during install or uninstall; skipped");
            return None;
        }
        let instance = self.instance.get()?;
        self.readers.set(self.readers.get() + 1);
        let _release = ReaderGuard(&self.readers);
        // SAFETY: the slot holds the instance until `release`, which only
        // happens when no borrow is active; no exclusive borrow is active.
        let plugin = unsafe { &*instance.as_ref().object.as_ptr() };
        Some(f(plugin))
    }

    fn with_exclusive<R>(&self, f: impl FnOnce(&mut dyn Plugin) -> R) -> Option<R> {
        if self.is_busy() {
            error!("plugin is handling a callback; install/uninstall hook refused");
            return None;
        }
        let instance = self.instance.get()?;
        self.exclusive.set(true);
        let _release = ExclusiveGuard(&self.exclusive);
        // SAFETY: as in `with_shared`, and no other borrow is active.
        let plugin = unsafe { &mut *instance.as_ref().object.as_ptr() };
        Some(f(plugin))
    }

    fn is_busy(&self) -> bool {
        self.readers.get() > 0 || self.exclusive.get()
    }

    /// Takes the instance out; later calls through the slot do nothing.
    fn release(&self) -> Option<NonNull<PluginInstance>> {
        self.instance.take()
    }
}

struct ReaderGuard<'a>(&'a Cell<usize>);

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

struct ExclusiveGuard<'a>(&'a Cell<bool>);

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A created instance and the library its code lives in.
///
/// Dropping it calls the library's `destroy` for the instance exactly once,
/// then closes the library. `manager` must point at the owning manager
/// whenever the handle can drop; the manager rebinds it before teardown.
struct LoadedPlugin {
    manager: *mut PluginManager,
    installer: PluginInstaller,
    slot: Rc<PluginSlot>,
    library: ManuallyDrop<Box<dyn PluginLibrary>>,
}

impl Drop for LoadedPlugin {
    fn drop(&mut self) {
        if self.slot.is_busy() {
            // Destroying an instance that is mid-call would free it under
            // itself; its code must stay loaded too.
            error!(path = %self.library.path().display(), "plugin busy during teardown; leaking instance");
            return;
        }
        if let Some(instance) = self.slot.release() {
            // SAFETY: the instance came from this library's `create` and the
            // slot no longer hands it out.
            unsafe { (self.installer.destroy)(self.manager, instance.as_ptr()) };
        }
        // SAFETY: dropped exactly once, after the last use of the instance.
        unsafe { ManuallyDrop::drop(&mut self.library) };
    }
}

/// Fields drop in order: the relay unsubscribes before the plugin goes.
struct PluginRecord {
    details: PluginDetails,
    relay: Option<Listener<PluginRelay>>,
    plugin: LoadedPlugin,
}

/// Owner of every loaded plugin.
///
/// Dropping the manager uninstalls all plugins, most recent first.
pub struct PluginManager {
    // Records drop before the heap their instances live in.
    records: Vec<PluginRecord>,
    index: HashMap<PluginId, usize>,
    memory: Arc<MemoryManager>,
    bus: EventBus,
    loader: Box<dyn LibraryLoader>,
    symbols: SymbolNames,
}

impl PluginManager {
    /// Manager with its own plugin heap scoped under `parent`, loading
    /// shared libraries from disk.
    pub fn new(bus: EventBus, parent: &Arc<MemoryManager>) -> Self {
        Self::with_memory(bus, Arc::new(MemoryManager::scoped(parent)))
    }

    /// Manager allocating instances directly from `memory`.
    pub fn with_memory(bus: EventBus, memory: Arc<MemoryManager>) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            memory,
            bus,
            loader: Box::new(DynamicLoader),
            symbols: SymbolNames::default(),
        }
    }

    pub fn with_loader(mut self, loader: impl LibraryLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_symbols(mut self, symbols: SymbolNames) -> Self {
        self.symbols = symbols;
        self
    }

    /// Loads the library at `path` and creates its plugin.
    ///
    /// Loading a path that is already loaded returns the existing id. On any
    /// error the set of loaded plugins is left exactly as it was.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn install(
        &mut self,
        path: impl AsRef<Path>,
        userptr: *mut c_void,
    ) -> Result<PluginId, PluginError> {
        let path = path.as_ref();
        let canonical = path.canonicalize().map_err(|source| PluginError::InvalidPath {
            path: path.to_path_buf(),
            source,
        })?;
        let details = PluginDetails::from_path(canonical);
        let id = details.id;
        if self.index.contains_key(&id) {
            debug!(plugin = %id, "already installed");
            return Ok(id);
        }

        let library = self.loader.open(&details.path)?;
        let installer = library.installer(&self.symbols)?;

        let this: *mut Self = self;
        // SAFETY: `create` follows the plugin ABI; the manager pointer is
        // only used for the duration of the call.
        let raw = unsafe { (installer.create)(this, userptr) };
        let Some(instance) = NonNull::new(raw) else {
            warn!(plugin = %id, "create returned null");
            return Err(PluginError::CreateFailed { path: details.path });
        };

        // From here on, dropping `plugin` (including by unwinding out of
        // `on_install`) destroys the instance and closes the library.
        let plugin = LoadedPlugin {
            manager: this,
            installer,
            slot: Rc::new(PluginSlot::new(instance)),
            library: ManuallyDrop::new(library),
        };
        let relay = self.bus.listener(PluginRelay {
            slot: plugin.slot.clone(),
        });
        {
            let mut ctx = PluginContext {
                details: &details,
                bus: &self.bus,
                relay: &relay,
                memory: &self.memory,
            };
            plugin.slot.with_exclusive(|p| p.on_install(&mut ctx));
        }

        info!(plugin = %id, name = %details.name, "plugin installed");
        self.index.insert(id, self.records.len());
        self.records.push(PluginRecord {
            details,
            relay: Some(relay),
            plugin,
        });
        Ok(id)
    }

    /// Unloads the plugin `id`. Returns `false` if it is not loaded.
    #[instrument(skip(self))]
    pub fn uninstall(&mut self, id: PluginId) -> bool {
        let Some(&position) = self.index.get(&id) else {
            return false;
        };
        if self.records[position].plugin.slot.is_busy() {
            error!(plugin = %id, "cannot uninstall a plugin from inside its own callback");
            return false;
        }
        let record = self.records.remove(position);
        self.reindex();
        self.teardown(record);
        true
    }

    /// Unloads every plugin, most recently installed first.
    pub fn uninstall_all(&mut self) -> usize {
        let this: *mut Self = self;
        for record in &mut self.records {
            record.plugin.manager = this;
        }
        let mut unloaded = 0;
        while let Some(record) = self.records.pop() {
            self.index.remove(&record.details.id);
            self.teardown(record);
            unloaded += 1;
        }
        unloaded
    }

    fn teardown(&mut self, mut record: PluginRecord) {
        record.plugin.manager = self as *mut Self;
        drop(record.relay.take());
        record.plugin.slot.with_exclusive(|plugin| plugin.on_uninstall());

        let PluginRecord { details, plugin, .. } = record;
        drop(plugin);
        info!(plugin = %details.id, name = %details.name, "plugin uninstalled");
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (position, record) in self.records.iter().enumerate() {
            self.index.insert(record.details.id, position);
        }
    }

    /// Sends `event` to every plugin in install order. Returns how many
    /// plugins handled it.
    pub fn fire(&self, event: &dyn AnyEvent) -> usize {
        self.records
            .iter()
            .filter_map(|record| record.plugin.slot.with_shared(|plugin| plugin.on_event(event)))
            .count()
    }

    /// Sends `event` to plugin `id` only.
    pub fn send(&self, event: &dyn AnyEvent, id: PluginId) -> bool {
        self.index
            .get(&id)
            .is_some_and(|&position| self.send_at(event, position))
    }

    /// Sends `event` to the plugin at install position `index`.
    pub fn send_at(&self, event: &dyn AnyEvent, index: usize) -> bool {
        self.records
            .get(index)
            .and_then(|record| record.plugin.slot.with_shared(|plugin| plugin.on_event(event)))
            .is_some()
    }

    // --- ABI helpers, called by plugin code ---

    /// Moves `plugin` into the plugin heap and wraps it in an instance handle.
    pub fn create_instance<P: Plugin>(&self, plugin: P) -> Result<NonNull<PluginInstance>, PluginError> {
        let object: NonNull<dyn Plugin> = self.memory.new_object(plugin)?;
        match self.memory.new_object(PluginInstance { object }) {
            Ok(instance) => Ok(instance),
            Err(e) => {
                // SAFETY: `object` was just created by `new_object`.
                if let Err(free) = unsafe { self.memory.delete_object(object) } {
                    error!("Failed to free plugin object: {free}");
                }
                Err(e.into())
            }
        }
    }

    /// Drops and frees an instance made by [`create_instance`](Self::create_instance).
    ///
    /// A null pointer is a no-op. A pointer the plugin heap does not own is
    /// rejected under the heap's free policy and left untouched.
    pub fn destroy_instance(&self, instance: *mut PluginInstance) -> Result<(), PluginError> {
        let Some(instance) = NonNull::new(instance) else {
            return Ok(());
        };
        if !self.memory.owns(instance.as_ptr().cast::<u8>()) {
            self.memory.deallocate(instance.as_ptr().cast::<u8>())?;
            return Err(AllocError::UnknownAddress(instance.as_ptr() as usize).into());
        }
        // SAFETY: owned by the plugin heap, so it was made by `create_instance`.
        unsafe {
            let object = instance.as_ref().object;
            self.memory.delete_object(object)?;
            self.memory.delete_object(instance)?;
        }
        Ok(())
    }

    // --- Introspection ---

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: PluginId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn details(&self, id: PluginId) -> Option<&PluginDetails> {
        self.index.get(&id).map(|&position| &self.records[position].details)
    }

    /// Loaded ids in install order.
    pub fn ids(&self) -> impl Iterator<Item = PluginId> + '_ {
        self.records.iter().map(|record| record.details.id)
    }

    /// The plugin heap.
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn symbols(&self) -> &SymbolNames {
        &self.symbols
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        let unloaded = self.uninstall_all();
        if unloaded > 0 {
            debug!(unloaded, "plugin manager dropped");
        }
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.records.iter().map(|r| &r.details.name).collect::<Vec<_>>())
            .field("heap", &self.memory)
            .field("symbols", &self.symbols)
            .finish()
    }
}
