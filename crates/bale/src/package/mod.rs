// Package model.
//
// This module provides the package record the planner and applier work
// on: identity, versions, dependency edges, options, shared library
// requirements, and the owned file/directory entries of the local side.

mod dep;
mod load;
mod package;

pub use dep::Dependency;
pub use load::Load;
pub use package::{Package, PkgDir, PkgFile};
