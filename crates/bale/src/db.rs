//! Local installed-package database contract.
//!
//! The planner and applier are written against this trait; backends
//! range from an embedded SQL store to the in-memory implementation in
//! [`crate::memory`]. Savepoint transactions, integrity staging, and the
//! advisory lock are all owned by the backend.

use bitflags::bitflags;

use crate::error::Result;
use crate::package::{Load, Package};

/// How a pattern is matched against package origins and names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Exact origin or name.
    Exact,
    /// Shell-style glob.
    Glob,
    /// Regular expression.
    Regex,
    /// Raw condition fragment, interpreted by SQL-backed stores.
    Condition,
    /// Every package; the pattern is ignored.
    All,
}

bitflags! {
    /// Behavior switches for installing an archive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AddFlags: u32 {
        const FORCE = 1 << 0;
        const NOSCRIPT = 1 << 1;
        const UPGRADE = 1 << 2;
        const AUTOMATIC = 1 << 3;
    }
}

bitflags! {
    /// Behavior switches for deleting an installed package.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeleteFlags: u32 {
        const FORCE = 1 << 0;
        const NOSCRIPT = 1 << 1;
    }
}

/// The local installed-package database.
pub trait Database {
    /// Take the exclusive advisory lock. Fails if another session holds
    /// it.
    fn obtain_lock(&mut self) -> Result<()>;

    /// Release the advisory lock. Releasing a lock that is not held is a
    /// no-op.
    fn release_lock(&mut self);

    /// Installed packages matching the pattern, with the requested field
    /// groups populated.
    fn query(&self, pattern: &str, kind: MatchKind, load: Load) -> Result<Vec<Package>>;

    /// Installed packages flagged automatic.
    fn query_automatic(&self, load: Load) -> Result<Vec<Package>>;

    /// Packages selected for deletion by the pattern. With `recursive`,
    /// the reverse-dependency closure is expanded by the backend and
    /// dependents precede their dependencies in the returned order.
    fn query_delete(
        &self,
        pattern: &str,
        kind: MatchKind,
        recursive: bool,
        load: Load,
    ) -> Result<Vec<Package>>;

    /// Open a named savepoint.
    fn transaction_begin(&mut self, savepoint: &str) -> Result<()>;

    /// Commit the innermost savepoint of that name.
    fn transaction_commit(&mut self, savepoint: &str) -> Result<()>;

    /// Roll back the innermost savepoint of that name.
    fn transaction_rollback(&mut self, savepoint: &str) -> Result<()>;

    /// Stage a candidate package for the next integrity check.
    fn integrity_append(&mut self, pkg: &Package) -> Result<()>;

    /// Check the staged set for unresolvable conflicts.
    fn integrity_check(&mut self) -> Result<()>;

    /// Installed packages (of a different origin) that conflict by owned
    /// file with the staged candidate at `origin`. These are candidates
    /// for displacement.
    fn integrity_conflict_local(&mut self, origin: &str) -> Result<Vec<Package>>;

    /// Record a package as installed.
    fn register(&mut self, pkg: Package) -> Result<()>;

    /// Drop a package from the installed set without touching its files.
    fn unregister(&mut self, origin: &str) -> Result<()>;

    /// Delete an installed package, honoring the flags. Not wrapped in
    /// any transaction by the caller.
    fn delete(&mut self, pkg: &Package, flags: DeleteFlags) -> Result<()>;
}
