//! # hearth-plugins
//!
//! Native plugins behind a two-symbol C ABI.
//!
//! ### Key Submodules:
//! - `details`: plugin identity from the canonical library path
//! - `installer`: ABI types and symbol names
//! - `loader`: `libloading`-backed and in-process library loaders
//! - `manager`: install/uninstall, dispatch, and the plugin heap
//! - `plugin`: the `Plugin` trait and its install context

pub mod details;
pub mod error;
pub mod installer;
pub mod loader;
pub mod manager;
pub mod plugin;

mod macros;

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}

pub use details::{PluginDetails, PluginId};
pub use error::{PluginError, PluginResult};
pub use installer::{
    CreateFn, DestroyFn, PluginInstaller, PluginInstance, SymbolNames, DEFAULT_CREATE_SYMBOL,
    DEFAULT_DESTROY_SYMBOL,
};
pub use loader::{
    inspect_library, DynamicLoader, LibraryLoader, PluginLibrary, StaticLoader, StaticSymbol,
    SymbolReport,
};
pub use manager::PluginManager;
pub use plugin::{Plugin, PluginContext, PluginRelay};
