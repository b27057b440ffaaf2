//! Plan ordering.
//!
//! `order_pool` drains the working set into the plan one dependency
//! layer at a time; a pass that moves nothing over a non-empty pool is a
//! dependency cycle. Autoremove uses the mirror image, peeling packages
//! nothing depends on anymore.

use super::JobSession;
use crate::error::{PkgError, Result};
use crate::events::Event;

impl JobSession<'_> {
    /// Move every package without pending dependencies into the plan and
    /// drop the satisfied edges from the rest of the pool.
    pub(crate) fn order_pool(&mut self) -> Result<()> {
        if self.bulk.is_empty() {
            return Ok(());
        }

        let ready: Vec<String> = self
            .bulk
            .values()
            .filter(|pkg| pkg.deps.is_empty())
            .map(|pkg| pkg.origin.clone())
            .collect();

        if ready.is_empty() {
            self.host.events.post(&Event::CircularDependency);
            return Err(PkgError::CircularDependency);
        }

        for origin in ready {
            if let Some(pkg) = self.bulk.shift_remove(&origin) {
                log::trace!("ordered {}", pkg.label());
                self.jobs.insert(origin.clone(), pkg);
                for remaining in self.bulk.values_mut() {
                    remaining.deps.shift_remove(&origin);
                }
            }
        }

        Ok(())
    }

    /// One autoremove step: move a package without surviving consumers
    /// into the plan and release its reverse edges. Returns false once no
    /// such package remains.
    pub(crate) fn autoremove_pass(&mut self) -> bool {
        let Some(origin) = self
            .bulk
            .values()
            .find(|pkg| pkg.rdeps.is_empty())
            .map(|pkg| pkg.origin.clone())
        else {
            return false;
        };

        if let Some(pkg) = self.bulk.shift_remove(&origin) {
            self.jobs.insert(origin.clone(), pkg);
            for remaining in self.bulk.values_mut() {
                remaining.rdeps.shift_remove(&origin);
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::{JobFlags, JobKind, JobSession};
    use crate::config::Config;
    use crate::db::MatchKind;
    use crate::error::PkgError;
    use crate::events::{Event, EventLog};
    use crate::fetch::FileFetcher;
    use crate::host::Host;
    use crate::memory::{MemoryArchives, MemoryCatalog, MemoryDatabase};
    use crate::package::{Dependency, Package};

    fn host_with(db: MemoryDatabase, catalog: MemoryCatalog, events: EventLog) -> Host {
        Host::new(
            Config::default().with_cache_dir("/nonexistent-cache"),
            Box::new(db),
            Box::new(catalog),
            Box::new(MemoryArchives::new()),
            Box::new(FileFetcher::new("/nonexistent-repo")),
        )
        .with_events(Box::new(events))
    }

    fn remote(origin: &str, version: &str) -> Package {
        let mut pkg = Package::new(origin, version);
        pkg.repo_path = format!("All/{}-{}.tgz", pkg.name, version);
        pkg
    }

    #[test]
    fn test_chain_orders_dependencies_first() {
        // c -> b -> a, requested in the opposite order
        let mut b = remote("misc/b", "1");
        b.add_dep(Dependency::new("a", "misc/a", "1"));
        let mut c = remote("misc/c", "1");
        c.add_dep(Dependency::new("b", "misc/b", "1"));
        let catalog = MemoryCatalog::with_packages([remote("misc/a", "1"), b, c]);
        let mut host = host_with(MemoryDatabase::new(), catalog, EventLog::new());

        let mut job = JobSession::new(JobKind::Install, &mut host);
        job.set_flags(JobFlags::PKG_VERSION_TEST);
        job.add(MatchKind::Exact, &["misc/c", "misc/a"]).unwrap();
        job.solve().unwrap();

        let plan: Vec<_> = job.iter().map(|p| p.origin.clone()).collect();
        assert_eq!(plan, vec!["misc/a", "misc/b", "misc/c"]);
    }

    #[test]
    fn test_cycle_is_fatal() {
        let mut x = remote("misc/x", "1");
        x.add_dep(Dependency::new("y", "misc/y", "1"));
        let mut y = remote("misc/y", "1");
        y.add_dep(Dependency::new("x", "misc/x", "1"));
        let catalog = MemoryCatalog::with_packages([x, y]);
        let events = EventLog::new();
        let mut host = host_with(MemoryDatabase::new(), catalog, events.clone());

        let mut job = JobSession::new(JobKind::Install, &mut host);
        job.set_flags(JobFlags::PKG_VERSION_TEST);
        job.add(MatchKind::Exact, &["misc/x"]).unwrap();

        assert!(matches!(job.solve(), Err(PkgError::CircularDependency)));
        assert!(events.contains(&Event::CircularDependency));
    }

    #[test]
    fn test_autoremove_peels_orphan_chain() {
        // b depends on a, both automatic, nothing depends on b
        let mut a = Package::new("misc/a", "1");
        a.automatic = true;
        let mut b = Package::new("misc/b", "1");
        b.automatic = true;
        b.add_dep(Dependency::new("a", "misc/a", "1"));
        let db = MemoryDatabase::with_packages([a, b]);
        let mut host = host_with(db, MemoryCatalog::new(), EventLog::new());

        let mut job = JobSession::new(JobKind::Autoremove, &mut host);
        job.solve().unwrap();

        let plan: Vec<_> = job.iter().map(|p| p.origin.clone()).collect();
        assert_eq!(plan, vec!["misc/b", "misc/a"]);
    }

    #[test]
    fn test_autoremove_spares_packages_with_consumers() {
        // lib is automatic but app (not automatic) still needs it
        let mut lib = Package::new("devel/lib", "1");
        lib.automatic = true;
        let mut app = Package::new("www/app", "1");
        app.add_dep(Dependency::new("lib", "devel/lib", "1"));
        let db = MemoryDatabase::with_packages([lib, app]);
        let mut host = host_with(db, MemoryCatalog::new(), EventLog::new());

        let mut job = JobSession::new(JobKind::Autoremove, &mut host);
        job.solve().unwrap();

        assert_eq!(job.count(), 0);
    }

    #[test]
    fn test_autoremove_handles_orphan_pairs_with_shared_root() {
        // two leaves over one shared automatic base
        let mut base = Package::new("misc/base", "1");
        base.automatic = true;
        let mut leaf1 = Package::new("misc/leaf1", "1");
        leaf1.automatic = true;
        leaf1.add_dep(Dependency::new("base", "misc/base", "1"));
        let mut leaf2 = Package::new("misc/leaf2", "1");
        leaf2.automatic = true;
        leaf2.add_dep(Dependency::new("base", "misc/base", "1"));
        let db = MemoryDatabase::with_packages([base, leaf1, leaf2]);
        let mut host = host_with(db, MemoryCatalog::new(), EventLog::new());

        let mut job = JobSession::new(JobKind::Autoremove, &mut host);
        job.solve().unwrap();

        let plan: Vec<_> = job.iter().map(|p| p.origin.clone()).collect();
        assert_eq!(plan.len(), 3);
        // the shared base goes last, after both consumers
        assert_eq!(plan[2], "misc/base");
    }
}
