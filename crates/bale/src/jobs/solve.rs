//! Per-kind planners.
//!
//! Planning pulls candidates out of the catalog, compares them against
//! the installed side, and fills the `bulk` working set; ordering then
//! drains `bulk` into the plan. Candidates that turn out to be already
//! satisfied park in `seen` so transitive expansion never looks them up
//! twice.

use std::cmp::Ordering;

use super::{JobFlags, JobKind, JobSession};
use crate::db::MatchKind;
use crate::error::{PkgError, Result};
use crate::events::Event;
use crate::package::{Load, Package};
use crate::version::version_cmp;

impl JobSession<'_> {
    pub(crate) fn solve_install(&mut self) -> Result<()> {
        if !self.flags.contains(JobFlags::PKG_VERSION_TEST) && self.new_pkg_version() {
            self.host.events.post(&Event::NewPkgVersion);
            return self.order_and_finish();
        }

        let patterns = self.patterns.clone();
        for jp in &patterns {
            match self.get_remote_pkg(&jp.pattern, jp.kind, true) {
                Ok(()) => {}
                Err(PkgError::NotFound { pattern }) => self.host.events.post(&Event::Error {
                    message: format!(
                        "No packages matching '{}' have been found in the repositories",
                        pattern
                    ),
                }),
                Err(err) => return Err(err),
            }
        }

        if self.bulk.is_empty() {
            // nothing matched; not an error, but there is no plan either
            return Ok(());
        }

        // edges into packages that are already satisfied locally carry no
        // ordering constraint
        let automatic = self.flags.contains(JobFlags::AUTOMATIC);
        let seen = &self.seen;
        for pkg in self.bulk.values_mut() {
            pkg.deps.retain(|origin, _| !seen.contains_key(origin));
            if pkg.direct {
                pkg.automatic = automatic;
            }
        }

        self.order_and_finish()
    }

    pub(crate) fn solve_upgrade(&mut self) -> Result<()> {
        if !self.flags.contains(JobFlags::PKG_VERSION_TEST) && self.new_pkg_version() {
            self.host.events.post(&Event::NewPkgVersion);
            return self.order_and_finish();
        }

        let installed = self.host.db.query("", MatchKind::All, Load::BASIC)?;
        for pkg in installed {
            // what does not exist remotely is simply skipped
            let _ = self.get_remote_pkg(&pkg.origin, MatchKind::Exact, false);
        }

        self.order_and_finish()
    }

    pub(crate) fn solve_autoremove(&mut self) -> Result<()> {
        let candidates = self.host.db.query_automatic(Load::BASIC | Load::RDEPS)?;
        for pkg in candidates {
            self.bulk.insert(pkg.origin.clone(), pkg);
        }

        while self.autoremove_pass() {}

        self.bulk.clear();
        self.solved = true;
        Ok(())
    }

    pub(crate) fn solve_deinstall(&mut self) -> Result<()> {
        let recursive = self.flags.contains(JobFlags::RECURSIVE);
        let patterns = self.patterns.clone();
        for jp in &patterns {
            let rows = self
                .host
                .db
                .query_delete(&jp.pattern, jp.kind, recursive, Load::BASIC)?;
            for pkg in rows {
                self.jobs.insert(pkg.origin.clone(), pkg);
            }
        }
        self.solved = true;
        Ok(())
    }

    pub(crate) fn solve_fetch(&mut self) -> Result<()> {
        if self.flags.contains(JobFlags::UPGRADES_FOR_INSTALLED) {
            let installed = self.host.db.query("", MatchKind::All, Load::BASIC)?;
            for pkg in installed {
                let _ = self.get_remote_pkg(&pkg.origin, MatchKind::Exact, false);
            }
        } else {
            let patterns = self.patterns.clone();
            for jp in &patterns {
                match self.get_remote_pkg(&jp.pattern, jp.kind, true) {
                    Ok(()) => {}
                    Err(PkgError::NotFound { pattern }) => {
                        self.host.events.post(&Event::Error {
                            message: format!(
                                "No packages matching '{}' have been found in the repositories",
                                pattern
                            ),
                        })
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        self.seen.clear();
        // no ordering needed, the plan has no install-time dependencies
        self.jobs = std::mem::take(&mut self.bulk);
        self.solved = true;
        Ok(())
    }

    /// Probe for a pending self-update of the package manager itself.
    /// True when one of the configured origins is installed locally and
    /// the catalog answered for it.
    fn new_pkg_version(&mut self) -> bool {
        let origins = self.host.config.self_update_origins.clone();
        let mut found = None;
        for origin in origins {
            if let Ok(Some(_)) = self.get_local_pkg(&origin) {
                found = Some(origin);
                break;
            }
        }

        // no local package manager package; a development build, skip
        let Some(origin) = found else {
            return false;
        };

        self.get_remote_pkg(&origin, MatchKind::Exact, true).is_ok()
    }

    /// Pull the best candidates for a pattern out of the catalog and
    /// expand their dependency closure into `bulk`.
    ///
    /// `root` marks a top-level user request: only those honor `FORCE`,
    /// report already-installed packages, and expand reverse
    /// dependencies (under `RECURSIVE`).
    pub(crate) fn get_remote_pkg(
        &mut self,
        pattern: &str,
        kind: MatchKind,
        root: bool,
    ) -> Result<()> {
        let force = (root && self.flags.contains(JobFlags::FORCE))
            || (self.kind == JobKind::Upgrade && self.flags.contains(JobFlags::FORCE));

        let mut load = Load::BASIC | Load::OPTIONS | Load::SHLIBS_REQUIRED;
        if self.kind == JobKind::Fetch {
            if self
                .flags
                .intersects(JobFlags::WITH_DEPS | JobFlags::UPGRADES_FOR_INSTALLED)
            {
                load |= Load::DEPS;
            }
        } else {
            load |= Load::DEPS;
        }
        if root && self.flags.contains(JobFlags::RECURSIVE) {
            load |= Load::RDEPS;
        }

        let candidates =
            self.host
                .catalog
                .query(pattern, kind, self.repo_name.as_deref(), load)?;
        let mut examined = false;

        for mut p in candidates {
            let origin = p.origin.clone();

            if let Some(existing) = self.bulk.get_mut(&origin) {
                existing.direct = root;
                // keep the higher version of duplicate candidates
                if version_cmp(&existing.version, &p.version) != Ordering::Less {
                    continue;
                }
                self.bulk.shift_remove(&origin);
            }

            if self.kind != JobKind::Fetch && !self.newer_than_local(&mut p, force)? {
                if root {
                    self.host.events.post(&Event::AlreadyInstalled {
                        origin: origin.clone(),
                        version: p.version.clone(),
                    });
                }
                examined = true;
                self.seen.insert(origin, p);
                continue;
            }

            examined = true;
            p.direct = root;
            self.bulk.insert(origin.clone(), p);
            self.populate_deps(&origin)?;
            self.populate_rdeps(&origin)?;
        }

        if examined {
            Ok(())
        } else {
            Err(PkgError::NotFound {
                pattern: pattern.to_string(),
            })
        }
    }

    /// Expand the direct dependencies of a bulk entry as non-root
    /// lookups. A dependency the catalog cannot answer for is fatal.
    fn populate_deps(&mut self, origin: &str) -> Result<()> {
        let dep_origins: Vec<String> = self
            .bulk
            .get(origin)
            .map(|pkg| pkg.deps.keys().cloned().collect())
            .unwrap_or_default();

        for dep in dep_origins {
            if self.bulk.contains_key(&dep) || self.seen.contains_key(&dep) {
                continue;
            }
            if self.get_remote_pkg(&dep, MatchKind::Exact, false).is_err() {
                self.host.events.post(&Event::MissingDependency {
                    origin: dep.clone(),
                });
                return Err(PkgError::MissingDependency { origin: dep });
            }
        }

        Ok(())
    }

    /// Expand reverse dependencies the same way. Only populated when the
    /// candidate was loaded with reverse edges (root + `RECURSIVE`).
    fn populate_rdeps(&mut self, origin: &str) -> Result<()> {
        let rdep_origins: Vec<String> = self
            .bulk
            .get(origin)
            .map(|pkg| pkg.rdeps.keys().cloned().collect())
            .unwrap_or_default();

        for rdep in rdep_origins {
            if self.bulk.contains_key(&rdep) || self.seen.contains_key(&rdep) {
                continue;
            }
            if self.get_remote_pkg(&rdep, MatchKind::Exact, false).is_err() {
                self.host.events.post(&Event::MissingDependency {
                    origin: rdep.clone(),
                });
                return Err(PkgError::MissingDependency { origin: rdep });
            }
        }

        Ok(())
    }

    /// Decide whether a remote candidate replaces the local package at
    /// the same origin, mirroring the local attributes onto the
    /// candidate so it carries both sides of the upgrade forward.
    fn newer_than_local(&mut self, rp: &mut Package, force: bool) -> Result<bool> {
        let local = self.get_local_pkg(&rp.origin)?;

        // no local package, the candidate is plainly new
        let Some(local) = local else {
            rp.automatic = true;
            return Ok(true);
        };

        if local.locked {
            return Ok(false);
        }

        let remote_version = rp.version.clone();
        rp.new_version = Some(remote_version.clone());
        rp.version = local.version.clone();
        rp.new_flatsize = rp.flatsize;
        rp.flatsize = local.flatsize;
        rp.automatic = local.automatic;

        if force {
            return Ok(true);
        }

        match version_cmp(&remote_version, &local.version) {
            Ordering::Greater => return Ok(true),
            Ordering::Equal => {}
            Ordering::Less => {
                if !self.host.config.refresh_on_change {
                    return Ok(false);
                }
            }
        }

        // the structural diffs are order-sensitive on purpose: they
        // mirror how the stores iterate these sets
        let options = |pkg: &Package| -> String {
            pkg.options
                .iter()
                .map(|(k, v)| format!("{}={} ", k, v))
                .collect()
        };
        if options(rp) != options(&local) {
            return Ok(true);
        }

        let dep_names =
            |pkg: &Package| -> String { pkg.deps.values().map(|d| d.name.as_str()).collect() };
        if dep_names(rp) != dep_names(&local) {
            return Ok(true);
        }

        let shlibs = |pkg: &Package| -> String { pkg.shlibs_required.concat() };
        if shlibs(rp) != shlibs(&local) {
            return Ok(true);
        }

        Ok(false)
    }

    fn get_local_pkg(&mut self, origin: &str) -> Result<Option<Package>> {
        let load = Load::BASIC | Load::DEPS | Load::OPTIONS | Load::SHLIBS_REQUIRED;
        Ok(self
            .host
            .db
            .query(origin, MatchKind::Exact, load)?
            .into_iter()
            .next())
    }
}
