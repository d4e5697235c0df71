/// Exports the ABI pair for a plugin type.
///
/// `$ctor` is a `fn(&mut PluginManager, *mut c_void) -> P`; a non-capturing
/// closure works.
///
/// ```ignore
/// struct Echo;
///
/// impl hearth_plugins::Plugin for Echo {
///     fn on_event(&self, _event: &dyn hearth_core::events::AnyEvent) {}
/// }
///
/// hearth_plugins::export_plugin!(Echo, |_manager, _userptr| Echo);
/// ```
///
/// The `static` form generates the same functions under the given names
/// without `#[no_mangle]`, for registration with a
/// [`StaticLoader`](crate::StaticLoader):
///
/// ```ignore
/// hearth_plugins::export_plugin!(static echo_create, echo_destroy => Echo, |_, _| Echo);
/// loader.register(path, echo_create, echo_destroy);
/// ```
#[macro_export]
macro_rules! export_plugin {
    (@emit [$($attr:meta)*] $create:ident, $destroy:ident, $plugin:ty, $ctor:expr) => {
        $(#[$attr])*
        #[allow(clippy::not_unsafe_ptr_arg_deref)]
        pub extern "C" fn $create(
            manager: *mut $crate::PluginManager,
            userptr: *mut ::std::ffi::c_void,
        ) -> *mut $crate::PluginInstance {
            // SAFETY: the host passes the manager that is installing us.
            let Some(manager) = (unsafe { manager.as_mut() }) else {
                return ::std::ptr::null_mut();
            };
            let ctor: fn(&mut $crate::PluginManager, *mut ::std::ffi::c_void) -> $plugin = $ctor;
            let plugin = ctor(manager, userptr);
            match manager.create_instance(plugin) {
                Ok(instance) => instance.as_ptr(),
                Err(e) => {
                    $crate::__private::tracing::error!("Failed to create plugin instance: {e}");
                    ::std::ptr::null_mut()
                }
            }
        }

        $(#[$attr])*
        #[allow(clippy::not_unsafe_ptr_arg_deref)]
        pub extern "C" fn $destroy(
            manager: *mut $crate::PluginManager,
            instance: *mut $crate::PluginInstance,
        ) {
            // SAFETY: the host passes the manager that installed us.
            if let Some(manager) = unsafe { manager.as_ref() } {
                if let Err(e) = manager.destroy_instance(instance) {
                    $crate::__private::tracing::error!("Failed to destroy plugin instance: {e}");
                }
            }
        }
    };
    (static $create:ident, $destroy:ident => $plugin:ty, $ctor:expr $(,)?) => {
        $crate::export_plugin!(@emit [] $create, $destroy, $plugin, $ctor);
    };
    ($plugin:ty, $ctor:expr $(,)?) => {
        $crate::export_plugin!(@emit [no_mangle] hearth_plugin_create, hearth_plugin_destroy, $plugin, $ctor);
    };
}
