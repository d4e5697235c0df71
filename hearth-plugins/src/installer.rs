//! ## hearth-plugins::installer
//! **The C ABI between the host and a plugin library**
//!
//! A plugin library exports two symbols:
//!
//! ```text
//! extern "C" fn hearth_plugin_create(mgr: *mut PluginManager, userptr: *mut c_void) -> *mut PluginInstance;
//! extern "C" fn hearth_plugin_destroy(mgr: *mut PluginManager, ptr: *mut PluginInstance);
//! ```
//!
//! The instance is opaque to the host and allocated through the manager's
//! heap. It holds a Rust trait object, so host and plugin must be built with
//! the same toolchain and the same `hearth-plugins` version.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::manager::PluginManager;
use crate::plugin::Plugin;

pub const DEFAULT_CREATE_SYMBOL: &str = "hearth_plugin_create";
pub const DEFAULT_DESTROY_SYMBOL: &str = "hearth_plugin_destroy";

pub type CreateFn =
    unsafe extern "C" fn(manager: *mut PluginManager, userptr: *mut c_void) -> *mut PluginInstance;
pub type DestroyFn = unsafe extern "C" fn(manager: *mut PluginManager, instance: *mut PluginInstance);

/// Manager-allocated handle to a live plugin object.
pub struct PluginInstance {
    pub(crate) object: NonNull<dyn Plugin>,
}

/// The resolved create/destroy pair of a library.
#[derive(Debug, Clone, Copy)]
pub struct PluginInstaller {
    pub create: CreateFn,
    pub destroy: DestroyFn,
}

/// Names under which the create/destroy pair is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolNames {
    pub create: String,
    pub destroy: String,
}

impl SymbolNames {
    pub fn new(create: impl Into<String>, destroy: impl Into<String>) -> Self {
        Self {
            create: create.into(),
            destroy: destroy.into(),
        }
    }
}

impl Default for SymbolNames {
    fn default() -> Self {
        Self::new(DEFAULT_CREATE_SYMBOL, DEFAULT_DESTROY_SYMBOL)
    }
}
