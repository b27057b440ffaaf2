//! In-memory backends.
//!
//! Complete implementations of the store contracts over plain
//! collections: enough to embed the core without a SQL engine, and the
//! workhorse of the test-suite. Clones share state, so a handle kept by
//! the caller observes everything a session did.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexmap::{IndexMap, IndexSet};

use crate::archive::ArchiveSource;
use crate::catalog::Catalog;
use crate::db::{AddFlags, Database, DeleteFlags, MatchKind};
use crate::error::{PkgError, Result};
use crate::package::{Dependency, Load, Package};

pub(crate) fn pattern_matches(pkg: &Package, pattern: &str, kind: MatchKind) -> Result<bool> {
    match kind {
        MatchKind::All => Ok(true),
        MatchKind::Exact => Ok(pkg.origin == pattern || pkg.name == pattern),
        MatchKind::Glob => {
            let glob = glob::Pattern::new(pattern).map_err(|err| {
                PkgError::Database(format!("invalid glob '{}': {}", pattern, err))
            })?;
            Ok(glob.matches(&pkg.origin) || glob.matches(&pkg.name))
        }
        MatchKind::Regex => {
            let re = regex::Regex::new(pattern).map_err(|err| {
                PkgError::Database(format!("invalid regex '{}': {}", pattern, err))
            })?;
            Ok(re.is_match(&pkg.origin) || re.is_match(&pkg.name))
        }
        MatchKind::Condition => Err(PkgError::Database(
            "condition patterns require a SQL-backed store".to_string(),
        )),
    }
}

/// Reverse-dependency edges derived from the declared dependencies of a
/// package set. The declared `deps` maps are the source of truth.
fn derive_rdeps(packages: &IndexMap<String, Package>, origin: &str) -> IndexMap<String, Dependency> {
    let mut rdeps = IndexMap::new();
    for other in packages.values() {
        if other.origin != origin && other.deps.contains_key(origin) {
            rdeps.insert(
                other.origin.clone(),
                Dependency::new(&other.name, &other.origin, &other.version),
            );
        }
    }
    rdeps
}

#[derive(Debug, Default)]
struct DbState {
    installed: IndexMap<String, Package>,
    staged: Vec<Package>,
    snapshots: Vec<(String, IndexMap<String, Package>)>,
    locked: bool,
    tx_log: Vec<String>,
}

impl DbState {
    fn project(&self, pkg: &Package, load: Load) -> Package {
        let mut out = pkg.with_fields(load);
        if load.contains(Load::RDEPS) {
            out.rdeps = derive_rdeps(&self.installed, &pkg.origin);
        }
        out
    }
}

/// Installed-package database over plain collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<DbState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let db = Self::new();
        for pkg in packages {
            db.add_package(pkg);
        }
        db
    }

    /// Seed an installed package.
    pub fn add_package(&self, pkg: Package) {
        let mut state = self.inner.lock().unwrap();
        state.installed.insert(pkg.origin.clone(), pkg);
    }

    pub fn package(&self, origin: &str) -> Option<Package> {
        self.inner.lock().unwrap().installed.get(origin).cloned()
    }

    pub fn origins(&self) -> Vec<String> {
        self.inner.lock().unwrap().installed.keys().cloned().collect()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().unwrap().locked
    }

    /// Savepoint operations seen so far, e.g. `begin upgrade`.
    pub fn transaction_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().tx_log.clone()
    }
}

impl Database for MemoryDatabase {
    fn obtain_lock(&mut self) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.locked {
            return Err(PkgError::Database(
                "database is locked by another process".to_string(),
            ));
        }
        state.locked = true;
        Ok(())
    }

    fn release_lock(&mut self) {
        self.inner.lock().unwrap().locked = false;
    }

    fn query(&self, pattern: &str, kind: MatchKind, load: Load) -> Result<Vec<Package>> {
        let state = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for pkg in state.installed.values() {
            if pattern_matches(pkg, pattern, kind)? {
                out.push(state.project(pkg, load));
            }
        }
        Ok(out)
    }

    fn query_automatic(&self, load: Load) -> Result<Vec<Package>> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .installed
            .values()
            .filter(|pkg| pkg.automatic)
            .map(|pkg| state.project(pkg, load))
            .collect())
    }

    fn query_delete(
        &self,
        pattern: &str,
        kind: MatchKind,
        recursive: bool,
        load: Load,
    ) -> Result<Vec<Package>> {
        let state = self.inner.lock().unwrap();

        let mut selected: IndexSet<String> = IndexSet::new();
        for pkg in state.installed.values() {
            if pattern_matches(pkg, pattern, kind)? {
                selected.insert(pkg.origin.clone());
            }
        }

        if recursive {
            // pull in everything that transitively depends on the selection
            let mut queue: Vec<String> = selected.iter().cloned().collect();
            while let Some(origin) = queue.pop() {
                for other in state.installed.values() {
                    if other.deps.contains_key(&origin) && selected.insert(other.origin.clone()) {
                        queue.push(other.origin.clone());
                    }
                }
            }
        }

        // dependents come out before the packages they depend on
        let mut remaining = selected;
        let mut ordered = Vec::new();
        while !remaining.is_empty() {
            let next = remaining.iter().find(|origin| {
                !remaining.iter().any(|other| {
                    other != *origin
                        && state
                            .installed
                            .get(other)
                            .is_some_and(|pkg| pkg.deps.contains_key(*origin))
                })
            });
            match next.cloned() {
                Some(origin) => {
                    remaining.shift_remove(&origin);
                    ordered.push(origin);
                }
                None => {
                    // dependency cycle in the installed set; flush as-is
                    ordered.extend(remaining.drain(..));
                }
            }
        }

        Ok(ordered
            .iter()
            .filter_map(|origin| state.installed.get(origin))
            .map(|pkg| state.project(pkg, load))
            .collect())
    }

    fn transaction_begin(&mut self, savepoint: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let snapshot = state.installed.clone();
        state.snapshots.push((savepoint.to_string(), snapshot));
        state.tx_log.push(format!("begin {}", savepoint));
        Ok(())
    }

    fn transaction_commit(&mut self, savepoint: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        match state.snapshots.pop() {
            Some((name, _)) if name == savepoint => {
                state.tx_log.push(format!("commit {}", savepoint));
                Ok(())
            }
            Some((name, snapshot)) => {
                state.snapshots.push((name, snapshot));
                Err(PkgError::Database(format!(
                    "savepoint mismatch on commit of '{}'",
                    savepoint
                )))
            }
            None => Err(PkgError::Database(format!(
                "no open savepoint named '{}'",
                savepoint
            ))),
        }
    }

    fn transaction_rollback(&mut self, savepoint: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        match state.snapshots.pop() {
            Some((name, snapshot)) if name == savepoint => {
                state.installed = snapshot;
                state.tx_log.push(format!("rollback {}", savepoint));
                Ok(())
            }
            Some((name, snapshot)) => {
                state.snapshots.push((name, snapshot));
                Err(PkgError::Database(format!(
                    "savepoint mismatch on rollback of '{}'",
                    savepoint
                )))
            }
            None => Err(PkgError::Database(format!(
                "no open savepoint named '{}'",
                savepoint
            ))),
        }
    }

    fn integrity_append(&mut self, pkg: &Package) -> Result<()> {
        self.inner.lock().unwrap().staged.push(pkg.clone());
        Ok(())
    }

    fn integrity_check(&mut self) -> Result<()> {
        let state = self.inner.lock().unwrap();
        // two staged packages of different origin claiming the same path
        // cannot be resolved by displacement
        for (i, a) in state.staged.iter().enumerate() {
            for b in state.staged.iter().skip(i + 1) {
                if a.origin == b.origin {
                    continue;
                }
                if a.files.iter().any(|f| b.has_file(&f.path)) {
                    log::warn!(
                        "{} and {} both want the same path",
                        a.label(),
                        b.label()
                    );
                    return Err(PkgError::Integrity);
                }
            }
        }
        Ok(())
    }

    fn integrity_conflict_local(&mut self, origin: &str) -> Result<Vec<Package>> {
        let state = self.inner.lock().unwrap();
        let Some(candidate) = state.staged.iter().find(|pkg| pkg.origin == origin) else {
            return Ok(Vec::new());
        };
        Ok(state
            .installed
            .values()
            .filter(|local| {
                local.origin != origin
                    && local.files.iter().any(|f| candidate.has_file(&f.path))
            })
            .cloned()
            .collect())
    }

    fn register(&mut self, pkg: Package) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let mut pkg = pkg;
        pkg.direct = false;
        for file in &mut pkg.files {
            file.keep = false;
        }
        for dir in &mut pkg.dirs {
            dir.keep = false;
        }
        state.installed.insert(pkg.origin.clone(), pkg);
        Ok(())
    }

    fn unregister(&mut self, origin: &str) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state
            .installed
            .shift_remove(origin)
            .map(|_| ())
            .ok_or_else(|| PkgError::Database(format!("{} is not registered", origin)))
    }

    fn delete(&mut self, pkg: &Package, _flags: DeleteFlags) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let Some(installed) = state.installed.get(&pkg.origin) else {
            return Err(PkgError::Database(format!(
                "{} is not registered",
                pkg.origin
            )));
        };
        if installed.locked {
            return Err(PkgError::Locked {
                origin: pkg.origin.clone(),
            });
        }
        state.installed.shift_remove(&pkg.origin);
        Ok(())
    }
}

/// Remote catalog over plain collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    name: Option<String>,
    packages: IndexMap<String, Vec<Package>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog answering only to the given repository name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn add_package(&mut self, pkg: Package) {
        self.packages
            .entry(pkg.origin.clone())
            .or_default()
            .push(pkg);
    }

    pub fn with_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut catalog = Self::new();
        for pkg in packages {
            catalog.add_package(pkg);
        }
        catalog
    }

    fn all_packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values().flatten()
    }
}

impl Catalog for MemoryCatalog {
    fn query(
        &self,
        pattern: &str,
        kind: MatchKind,
        repo: Option<&str>,
        load: Load,
    ) -> Result<Vec<Package>> {
        if let (Some(own), Some(requested)) = (&self.name, repo) {
            if own != requested {
                return Ok(Vec::new());
            }
        }

        let mut out = Vec::new();
        for pkg in self.all_packages() {
            if pattern_matches(pkg, pattern, kind)? {
                let mut candidate = pkg.with_fields(load);
                if load.contains(Load::RDEPS) {
                    let mut rdeps = IndexMap::new();
                    for other in self.all_packages() {
                        if other.origin != pkg.origin && other.deps.contains_key(&pkg.origin) {
                            rdeps.insert(
                                other.origin.clone(),
                                Dependency::new(&other.name, &other.origin, &other.version),
                            );
                        }
                    }
                    candidate.rdeps = rdeps;
                }
                out.push(candidate);
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct ArchState {
    archives: HashMap<PathBuf, Package>,
    added: Vec<String>,
    deleted_files: Vec<String>,
    deleted_dirs: Vec<String>,
}

/// Archive source over a map of paths; nothing touches the filesystem.
/// File and directory deletions are recorded instead of performed.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchives {
    inner: Arc<Mutex<ArchState>>,
}

impl MemoryArchives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an archive available at the given path.
    pub fn insert(&self, path: impl Into<PathBuf>, pkg: Package) {
        self.inner.lock().unwrap().archives.insert(path.into(), pkg);
    }

    /// Origins installed through this source, in order.
    pub fn added(&self) -> Vec<String> {
        self.inner.lock().unwrap().added.clone()
    }

    /// Paths of files deleted for displaced packages.
    pub fn deleted_files(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_files.clone()
    }

    pub fn deleted_dirs(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_dirs.clone()
    }
}

impl ArchiveSource for MemoryArchives {
    fn open(&self, path: &Path) -> Result<Package> {
        self.inner
            .lock()
            .unwrap()
            .archives
            .get(path)
            .cloned()
            .ok_or_else(|| PkgError::Archive(format!("no archive at {}", path.display())))
    }

    fn add(&self, db: &mut dyn Database, path: &Path, flags: AddFlags) -> Result<()> {
        let mut pkg = self.open(path)?;
        pkg.automatic = flags.contains(AddFlags::AUTOMATIC);
        self.inner.lock().unwrap().added.push(pkg.origin.clone());
        db.register(pkg)
    }

    fn delete_files(&self, pkg: &Package, _force: bool) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        for file in &pkg.files {
            if !file.keep {
                state.deleted_files.push(file.path.clone());
            }
        }
        Ok(())
    }

    fn delete_dirs(&self, pkg: &Package) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        for dir in &pkg.dirs {
            if !dir.keep {
                state.deleted_dirs.push(dir.path.clone());
            }
        }
        Ok(())
    }
}
