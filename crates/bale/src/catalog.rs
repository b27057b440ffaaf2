//! Remote repository catalog contract.

use crate::db::MatchKind;
use crate::error::Result;
use crate::package::{Load, Package};

/// A remote catalog of candidate packages.
///
/// Candidates come back with the requested field groups populated and
/// `repo_path`/`pkg_size` describing the artifact. Multiple versions of
/// the same origin may be returned; the planner keeps the best one.
pub trait Catalog {
    /// Candidates matching the pattern, optionally restricted to one
    /// named repository.
    fn query(
        &self,
        pattern: &str,
        kind: MatchKind,
        repo: Option<&str>,
        load: Load,
    ) -> Result<Vec<Package>>;
}
