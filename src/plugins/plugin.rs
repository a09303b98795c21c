use std::any::Any;

/// Common lifecycle of everything the host loads as a plugin
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Initialize the plugin. Returns false if the plugin could not start.
    fn init(&mut self) -> bool;

    /// Release everything the plugin acquired in `init`
    fn shutdown(&mut self) -> bool;

    /// Downcast support for hosts that need the concrete plugin type
    fn as_any(&self) -> &dyn Any;
}
