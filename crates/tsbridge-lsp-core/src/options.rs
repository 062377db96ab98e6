//! Process-wide configuration handed to the engine binding.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::request::{NullCancellationToken, SharedCancellationToken};

/// Delay before the engine collects projects nobody asked about recently.
pub const DEFAULT_GC_DELAY: Duration = Duration::from_millis(7000);

/// Options the server is started with.
///
/// Built once from the command line and passed to the engine binding when
/// it is created. Nothing reads these from global state.
#[derive(Clone)]
pub struct ServerOptions {
    /// Locale for engine messages, e.g. `en` or `pt-br`.
    pub locale: Option<String>,
    /// Plugins loaded into every project.
    pub global_plugins: Vec<String>,
    /// Extra directories searched for plugins.
    pub plugin_probe_locations: Vec<String>,
    /// Allow projects to load plugins from their own directories.
    pub allow_local_plugin_loads: bool,
    /// Put every loose file into one inferred project.
    pub use_single_inferred_project: bool,
    /// Group loose files into one inferred project per workspace root.
    pub use_inferred_project_per_project_root: bool,
    pub gc_delay: Duration,
    /// Shared with the session, which sets the current request on it.
    pub cancellation_token: SharedCancellationToken,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            locale: None,
            global_plugins: Vec::new(),
            plugin_probe_locations: Vec::new(),
            allow_local_plugin_loads: false,
            use_single_inferred_project: false,
            use_inferred_project_per_project_root: false,
            gc_delay: DEFAULT_GC_DELAY,
            cancellation_token: Arc::new(NullCancellationToken),
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("locale", &self.locale)
            .field("global_plugins", &self.global_plugins)
            .field("plugin_probe_locations", &self.plugin_probe_locations)
            .field("allow_local_plugin_loads", &self.allow_local_plugin_loads)
            .field("use_single_inferred_project", &self.use_single_inferred_project)
            .field(
                "use_inferred_project_per_project_root",
                &self.use_inferred_project_per_project_root,
            )
            .field("gc_delay", &self.gc_delay)
            .finish_non_exhaustive()
    }
}
