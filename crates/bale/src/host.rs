//! Bundle of the collaborators a job session works against.

use crate::archive::ArchiveSource;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::Database;
use crate::events::{EventSink, NullEvents};
use crate::fetch::Fetcher;
use crate::plugins::{NoPlugins, PluginHost};
use crate::scripts::{NullScripts, ScriptRunner};

/// Everything a session needs: configuration plus one implementation of
/// each collaborator contract. Scripts, events, and plugins default to
/// no-ops and can be swapped in builder style.
pub struct Host {
    pub config: Config,
    pub db: Box<dyn Database>,
    pub catalog: Box<dyn Catalog>,
    pub archives: Box<dyn ArchiveSource>,
    pub fetcher: Box<dyn Fetcher>,
    pub scripts: Box<dyn ScriptRunner>,
    pub events: Box<dyn EventSink>,
    pub plugins: Box<dyn PluginHost>,
}

impl Host {
    pub fn new(
        config: Config,
        db: Box<dyn Database>,
        catalog: Box<dyn Catalog>,
        archives: Box<dyn ArchiveSource>,
        fetcher: Box<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            db,
            catalog,
            archives,
            fetcher,
            scripts: Box::new(NullScripts),
            events: Box::new(NullEvents),
            plugins: Box::new(NoPlugins),
        }
    }

    pub fn with_scripts(mut self, scripts: Box<dyn ScriptRunner>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_events(mut self, events: Box<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_plugins(mut self, plugins: Box<dyn PluginHost>) -> Self {
        self.plugins = plugins;
        self
    }
}
