//! Configuration consumed by the core.

use std::env;
use std::path::PathBuf;

use directories::ProjectDirs;

/// Settings the planner and applier read. Loading and merging of
/// configuration files is the caller's business; the core only consumes
/// this struct.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where fetched artifacts are cached.
    pub cache_dir: PathBuf,
    /// Stop services owned by a package before displacing it.
    pub handle_rc_scripts: bool,
    /// Origins probed, in order, for a pending self-update of the
    /// package manager itself.
    pub self_update_origins: Vec<String>,
    /// Treat a candidate whose options, dependency names, or required
    /// shlibs differ from the local package as an upgrade even when its
    /// version is older.
    pub refresh_on_change: bool,
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = ProjectDirs::from("", "", "bale")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/var/cache/bale"));
        Self {
            cache_dir,
            handle_rc_scripts: false,
            self_update_origins: vec![
                "ports-mgmt/pkg".to_string(),
                "ports-mgmt/pkg-devel".to_string(),
            ],
            refresh_on_change: true,
        }
    }
}

impl Config {
    /// Defaults with environment overrides applied (`BALE_CACHEDIR`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("BALE_CACHEDIR") {
            if !dir.is_empty() {
                config.cache_dir = PathBuf::from(dir);
            }
        }
        config
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}
