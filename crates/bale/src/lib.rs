//! Job planning and application core for a binary package manager.
//!
//! Five job kinds (install, upgrade, deinstall, autoremove, fetch) are
//! planned against a local installed database and a remote catalog,
//! ordered by dependencies, fetched and integrity-checked, and applied
//! under savepoint transactions with lifecycle hooks around each phase.
//!
//! The database, catalog, archive reader, fetcher, event sink, script
//! runner, and plugin host are trait contracts bundled in a [`Host`];
//! [`memory`] ships complete in-memory backends.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fetch;
pub mod host;
pub mod jobs;
pub mod memory;
pub mod package;
pub mod plugins;
pub mod scripts;
pub mod version;

pub use archive::{ArchiveSource, DiskArchives};
pub use catalog::Catalog;
pub use config::Config;
pub use db::{AddFlags, Database, DeleteFlags, MatchKind};
pub use error::{PkgError, Result};
pub use events::{Event, EventLog, EventSink, LogEvents, NullEvents};
pub use fetch::{Fetcher, FileFetcher, HttpFetcher};
pub use host::Host;
pub use jobs::{JobFlags, JobKind, JobPattern, JobSession};
pub use memory::{MemoryArchives, MemoryCatalog, MemoryDatabase};
pub use package::{Dependency, Load, Package, PkgDir, PkgFile};
pub use plugins::{Hook, NoPlugins, Plugin, PluginHost, PluginRegistry};
pub use scripts::{NullScripts, ScriptKind, ScriptRunner, ShellScripts};
pub use version::version_cmp;
