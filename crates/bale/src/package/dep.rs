use std::fmt;

use serde::{Deserialize, Serialize};

/// A dependency edge between two packages.
///
/// Edges are owned by the package that declares them and reference the
/// other side by origin only; the actual record is looked up on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Short name of the target package.
    pub name: String,
    /// Stable identifier of the target package (`category/name`).
    pub origin: String,
    /// Version the edge was recorded against.
    pub version: String,
}

impl Dependency {
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}-{})", self.origin, self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_display() {
        let dep = Dependency::new("libfoo", "devel/libfoo", "2.1");
        assert_eq!(dep.to_string(), "devel/libfoo (libfoo-2.1)");
    }
}
