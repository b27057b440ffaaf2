use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Dependency, Load};
use crate::scripts::ScriptKind;

/// A file owned by an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgFile {
    pub path: String,
    /// Set by the applier when the replacement package owns the same
    /// path; kept files are skipped on deletion.
    #[serde(skip)]
    pub keep: bool,
}

impl PkgFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }
}

/// A directory owned by an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgDir {
    pub path: String,
    #[serde(skip)]
    pub keep: bool,
}

impl PkgDir {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }
}

/// One concrete package version.
///
/// The same record shape serves the local side (installed database), the
/// remote side (catalog candidate), and the archive manifest. On the
/// candidate side of an upgrade, `version`/`flatsize` mirror the local
/// package and `new_version`/`new_flatsize` carry the remote values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Stable identifier, e.g. `ports-mgmt/pkg`.
    pub origin: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
    /// Installed size in bytes.
    #[serde(default)]
    pub flatsize: i64,
    #[serde(default)]
    pub new_flatsize: i64,
    /// Compressed artifact size in bytes.
    #[serde(default)]
    pub pkg_size: i64,
    /// Repository-relative artifact path.
    #[serde(default)]
    pub repo_path: String,
    /// Hex sha256 of the artifact, when the catalog records one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<String>,
    /// Installed as a dependency, not directly requested.
    #[serde(default)]
    pub automatic: bool,
    /// Forbids modification; plans touching the package abort.
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub deps: IndexMap<String, Dependency>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub rdeps: IndexMap<String, Dependency>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shlibs_required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PkgFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dirs: Vec<PkgDir>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scripts: IndexMap<ScriptKind, String>,
    /// The user asked for this package by name, not via expansion.
    #[serde(skip)]
    pub direct: bool,
}

impl Package {
    /// Create a package with the short name derived from the origin tail.
    pub fn new(origin: impl Into<String>, version: impl Into<String>) -> Self {
        let origin = origin.into();
        let name = origin
            .rsplit('/')
            .next()
            .unwrap_or(origin.as_str())
            .to_string();
        Self {
            origin,
            name,
            version: version.into(),
            ..Self::default()
        }
    }

    /// `name-version` label used in user-facing messages.
    pub fn label(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn add_dep(&mut self, dep: Dependency) {
        self.deps.insert(dep.origin.clone(), dep);
    }

    pub fn add_rdep(&mut self, dep: Dependency) {
        self.rdeps.insert(dep.origin.clone(), dep);
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.iter().any(|d| d.path == path)
    }

    /// Projection a store hands out: the requested field groups are kept,
    /// everything else is cleared as if it had never been loaded.
    pub fn with_fields(&self, load: Load) -> Package {
        let mut pkg = self.clone();
        if !load.contains(Load::DEPS) {
            pkg.deps.clear();
        }
        if !load.contains(Load::RDEPS) {
            pkg.rdeps.clear();
        }
        if !load.contains(Load::OPTIONS) {
            pkg.options.clear();
        }
        if !load.contains(Load::SHLIBS_REQUIRED) {
            pkg.shlibs_required.clear();
        }
        if !load.contains(Load::FILES) {
            pkg.files.clear();
        }
        if !load.contains(Load::DIRS) {
            pkg.dirs.clear();
        }
        if !load.contains(Load::SCRIPTS) {
            pkg.scripts.clear();
        }
        pkg
    }
}
