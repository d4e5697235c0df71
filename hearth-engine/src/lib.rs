//! # hearth-engine
//!
//! Main loop and application host.
//!
//! ### Key Submodules:
//! - `loop_system`: hierarchical enter/idle/exit runner
//! - `window`: windowing collaborator and a headless implementation
//! - `events`: lifecycle and frame events
//! - `app`: the application host

pub mod app;
pub mod events;
pub mod loop_system;
pub mod window;

pub use app::{Application, ApplicationBuilder};
pub use loop_system::{LoopError, LoopSystem, WeakLoopSystem};
pub use window::{HeadlessWindow, Window};

pub mod prelude {
    pub use super::events::*;
    pub use super::{Application, HeadlessWindow, LoopError, LoopSystem, Window};
}
