//! Plugin hooks fired around each apply phase.

use crate::error::Result;

/// Hook points surrounding the apply phases. Install and upgrade share
/// the installer body but keep their own hook pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    PreInstall,
    PostInstall,
    PreDeinstall,
    PostDeinstall,
    PreFetch,
    PostFetch,
    PreUpgrade,
    PostUpgrade,
    PreAutoremove,
    PostAutoremove,
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Hook::PreInstall => "pre-install",
            Hook::PostInstall => "post-install",
            Hook::PreDeinstall => "pre-deinstall",
            Hook::PostDeinstall => "post-deinstall",
            Hook::PreFetch => "pre-fetch",
            Hook::PostFetch => "post-fetch",
            Hook::PreUpgrade => "pre-upgrade",
            Hook::PostUpgrade => "post-upgrade",
            Hook::PreAutoremove => "pre-autoremove",
            Hook::PostAutoremove => "post-autoremove",
        }
    }

    pub fn all() -> &'static [Hook] {
        &[
            Hook::PreInstall,
            Hook::PostInstall,
            Hook::PreDeinstall,
            Hook::PostDeinstall,
            Hook::PreFetch,
            Hook::PostFetch,
            Hook::PreUpgrade,
            Hook::PostUpgrade,
            Hook::PreAutoremove,
            Hook::PostAutoremove,
        ]
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A registered plugin.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn on_hook(&self, hook: Hook) -> Result<()>;
}

/// Fires hooks on whatever plugins are loaded.
pub trait PluginHost {
    fn run(&self, hook: Hook);
}

/// Host with no plugins.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlugins;

impl PluginHost for NoPlugins {
    fn run(&self, _hook: Hook) {}
}

/// Plugin registry firing hooks in registration order. A failing plugin
/// is logged and skipped; it never aborts the phase.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        log::debug!("registered plugin {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl PluginHost for PluginRegistry {
    fn run(&self, hook: Hook) {
        for plugin in &self.plugins {
            if let Err(err) = plugin.on_hook(hook) {
                log::warn!("plugin {} failed on {}: {}", plugin.name(), hook, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::PkgError;

    struct Recorder {
        name: String,
        fired: Arc<Mutex<Vec<(String, Hook)>>>,
        fail: bool,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_hook(&self, hook: Hook) -> Result<()> {
            self.fired.lock().unwrap().push((self.name.clone(), hook));
            if self.fail {
                return Err(PkgError::Script("plugin exploded".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_registry_fires_in_registration_order() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        for name in ["first", "second"] {
            registry.register(Box::new(Recorder {
                name: name.to_string(),
                fired: fired.clone(),
                fail: false,
            }));
        }

        registry.run(Hook::PreInstall);

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].0, "first");
        assert_eq!(fired[1], ("second".to_string(), Hook::PreInstall));
    }

    #[test]
    fn test_failing_plugin_does_not_stop_the_rest() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(Recorder {
            name: "bad".to_string(),
            fired: fired.clone(),
            fail: true,
        }));
        registry.register(Box::new(Recorder {
            name: "good".to_string(),
            fired: fired.clone(),
            fail: false,
        }));

        registry.run(Hook::PostFetch);

        assert_eq!(fired.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_hook_names() {
        assert_eq!(Hook::PreAutoremove.name(), "pre-autoremove");
        assert_eq!(Hook::all().len(), 10);
    }
}
