//! Plan execution.
//!
//! The installer walks the ordered plan under a repeating savepoint:
//! displaced locals are unregistered before the new archive goes in, and
//! the savepoint is committed and reopened whenever the displacement
//! queue drains, so a file-conflict cluster always commits atomically.
//! The deinstall walk is deliberately not transactional; deletions are
//! individually final.

use super::{JobFlags, JobSession};
use crate::db::{AddFlags, DeleteFlags, MatchKind};
use crate::error::{PkgError, Result};
use crate::events::Event;
use crate::package::{Load, Package};
use crate::scripts::ScriptKind;

const SAVEPOINT: &str = "upgrade";

/// Mark everything the replacement archive also owns so deletion leaves
/// it in place.
fn keep_files_to_del(local: &mut Package, new: &Package) {
    for file in &mut local.files {
        if !file.keep {
            file.keep = new.has_file(&file.path);
        }
    }
    for dir in &mut local.dirs {
        if !dir.keep {
            dir.keep = new.has_dir(&dir.path);
        }
    }
}

impl JobSession<'_> {
    pub(crate) fn apply_install(&mut self) -> Result<()> {
        self.fetch_jobs()?;

        if self.flags.contains(JobFlags::SKIP_INSTALL) {
            return Ok(());
        }

        let cache_dir = self.host.config.cache_dir.clone();
        let handle_rc = self.host.config.handle_rc_scripts;
        let noscript = self.flags.contains(JobFlags::NOSCRIPT);
        let local_load = Load::BASIC | Load::FILES | Load::SCRIPTS | Load::DIRS;

        self.host.db.transaction_begin(SAVEPOINT)?;
        let mut queue: Vec<Package> = Vec::new();

        for idx in 0..self.jobs.len() {
            let (origin, repo_path, new_version, automatic, version) = {
                let p = &self.jobs[idx];
                (
                    p.origin.clone(),
                    p.repo_path.clone(),
                    p.new_version.clone(),
                    p.automatic,
                    p.version.clone(),
                )
            };

            // a populated new_version marks the displacement path; the
            // local package at the same origin goes first
            if new_version.is_some() {
                let local = self
                    .host
                    .db
                    .query(&origin, MatchKind::Exact, local_load)?
                    .into_iter()
                    .next();
                if let Some(local) = local {
                    if let Err(err) = self.displace(&mut queue, local, noscript, handle_rc) {
                        self.host.db.transaction_rollback(SAVEPOINT)?;
                        return Err(err);
                    }
                }
            }

            // then whatever conflicts with the incoming files
            let conflicts = self.host.db.integrity_conflict_local(&origin)?;
            for local in conflicts {
                if let Err(err) = self.displace(&mut queue, local, noscript, handle_rc) {
                    self.host.db.transaction_rollback(SAVEPOINT)?;
                    return Err(err);
                }
            }

            let path = cache_dir.join(&repo_path);
            let newpkg = match self.host.archives.open(&path) {
                Ok(pkg) => pkg,
                Err(err) => {
                    self.host.db.transaction_rollback(SAVEPOINT)?;
                    return Err(err);
                }
            };

            match &new_version {
                Some(new_version) => self.host.events.post(&Event::UpgradeBegin {
                    origin: origin.clone(),
                    version: version.clone(),
                    new_version: new_version.clone(),
                }),
                None => self.host.events.post(&Event::InstallBegin {
                    origin: newpkg.origin.clone(),
                    version: newpkg.version.clone(),
                }),
            }

            for local in queue.iter_mut() {
                keep_files_to_del(local, &newpkg);
            }

            // the same-origin predecessor is fully removed now; other
            // queued conflicts wait for their own plan entry
            if let Some(pos) = queue.iter().position(|local| local.origin == origin) {
                let local = queue.remove(pos);
                if let Err(err) = self.host.archives.delete_files(&local, true) {
                    log::warn!("removing files of {}: {}", local.label(), err);
                }
                if !noscript {
                    if let Err(err) = self.host.scripts.run(&local, ScriptKind::PostDeinstall) {
                        log::warn!("post-deinstall for {}: {}", local.label(), err);
                    }
                }
                if let Err(err) = self.host.archives.delete_dirs(&local) {
                    log::warn!("removing dirs of {}: {}", local.label(), err);
                }
            }

            let mut add_flags = AddFlags::UPGRADE;
            if self.flags.contains(JobFlags::FORCE) {
                add_flags |= AddFlags::FORCE;
            }
            if noscript {
                add_flags |= AddFlags::NOSCRIPT;
            }
            if automatic {
                add_flags |= AddFlags::AUTOMATIC;
            }

            if let Err(err) = self
                .host
                .archives
                .add(self.host.db.as_mut(), &path, add_flags)
            {
                self.host.db.transaction_rollback(SAVEPOINT)?;
                return Err(err);
            }

            match &new_version {
                Some(new_version) => self.host.events.post(&Event::UpgradeFinished {
                    origin: origin.clone(),
                    version,
                    new_version: new_version.clone(),
                }),
                None => self.host.events.post(&Event::InstallFinished {
                    origin: newpkg.origin.clone(),
                    version: newpkg.version.clone(),
                }),
            }

            // a drained queue closes the current conflict cluster; bound
            // the transaction there
            if queue.is_empty() && idx + 1 < self.jobs.len() {
                self.host.db.transaction_commit(SAVEPOINT)?;
                self.host.db.transaction_begin(SAVEPOINT)?;
            }
        }

        self.host.db.transaction_commit(SAVEPOINT)?;
        // conflicting locals whose origin never matched a plan entry are
        // dropped with the queue here
        Ok(())
    }

    /// Pull one displaced local out of the installed set: deinstall
    /// script, service stop, unregister, then park it on the queue until
    /// its files are reconciled against the replacement.
    fn displace(
        &mut self,
        queue: &mut Vec<Package>,
        local: Package,
        noscript: bool,
        handle_rc: bool,
    ) -> Result<()> {
        if local.locked {
            self.host.events.post(&Event::Locked {
                origin: local.origin.clone(),
            });
            return Err(PkgError::Locked {
                origin: local.origin,
            });
        }

        if !noscript {
            if let Err(err) = self.host.scripts.run(&local, ScriptKind::PreDeinstall) {
                log::warn!("pre-deinstall for {}: {}", local.label(), err);
            }
        }
        if handle_rc {
            if let Err(err) = self.host.scripts.stop_services(&local) {
                log::warn!("stopping services of {}: {}", local.label(), err);
            }
        }

        self.host.db.unregister(&local.origin)?;
        queue.push(local);
        Ok(())
    }

    pub(crate) fn apply_deinstall(&mut self) -> Result<()> {
        if self.flags.contains(JobFlags::DRY_RUN) {
            return Ok(());
        }

        let mut flags = DeleteFlags::empty();
        if self.flags.contains(JobFlags::FORCE) {
            flags |= DeleteFlags::FORCE;
        }
        if self.flags.contains(JobFlags::NOSCRIPT) {
            flags |= DeleteFlags::NOSCRIPT;
        }

        for idx in 0..self.jobs.len() {
            let pkg = &self.jobs[idx];
            self.host.db.delete(pkg, flags)?;
        }

        Ok(())
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
    use crate::package::{Package, PkgFile};

    struct ApplyFixture {
        repo: tempfile::TempDir,
        cache: tempfile::TempDir,
        db: MemoryDatabase,
        archives: MemoryArchives,
        events: EventLog,
    }

    impl ApplyFixture {
        fn new() -> Self {
            Self {
                repo: tempfile::tempdir().unwrap(),
                cache: tempfile::tempdir().unwrap(),
                db: MemoryDatabase::new(),
                archives: MemoryArchives::new(),
                events: EventLog::new(),
            }
        }

        /// A remote candidate whose artifact and archive manifest exist.
        fn candidate(&self, origin: &str, version: &str) -> Package {
            let mut pkg = Package::new(origin, version);
            pkg.repo_path = format!("All/{}-{}.tgz", pkg.name, version);
            pkg.pkg_size = 4;
            let artifact = self.repo.path().join(&pkg.repo_path);
            std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
            std::fs::write(&artifact, b"data").unwrap();
            self.archives
                .insert(self.cache.path().join(&pkg.repo_path), pkg.clone());
            pkg
        }

        fn host(&self, catalog: MemoryCatalog) -> Host {
            Host::new(
                Config::default().with_cache_dir(self.cache.path()),
                Box::new(self.db.clone()),
                Box::new(catalog),
                Box::new(self.archives.clone()),
                Box::new(FileFetcher::new(self.repo.path())),
            )
            .with_events(Box::new(self.events.clone()))
        }
    }

    #[test]
    fn test_fresh_install_registers_package() {
        let fixture = ApplyFixture::new();
        let pkg = fixture.candidate("misc/foo", "1.0");
        let mut host = fixture.host(MemoryCatalog::with_packages([pkg]));

        let mut job = JobSession::new(JobKind::Install, &mut host);
        job.set_flags(JobFlags::PKG_VERSION_TEST);
        job.add(MatchKind::Exact, &["misc/foo"]).unwrap();
        job.solve().unwrap();
        job.apply().unwrap();

        assert!(fixture.db.package("misc/foo").is_some());
        assert!(fixture.events.contains(&Event::InstallBegin {
            origin: "misc/foo".to_string(),
            version: "1.0".to_string(),
        }));
        assert!(fixture.events.contains(&Event::InstallFinished {
            origin: "misc/foo".to_string(),
            version: "1.0".to_string(),
        }));
        // one savepoint, committed once
        assert_eq!(
            fixture.db.transaction_log(),
            vec!["begin upgrade", "commit upgrade"]
        );
    }

    #[test]
    fn test_upgrade_displaces_old_version() {
        let fixture = ApplyFixture::new();
        let mut old = Package::new("misc/foo", "1.0");
        old.files.push(PkgFile::new("/usr/local/bin/foo"));
        old.files.push(PkgFile::new("/usr/local/etc/foo.conf"));
        fixture.db.add_package(old);

        let mut new = fixture.candidate("misc/foo", "2.0");
        new.files.push(PkgFile::new("/usr/local/etc/foo.conf"));
        // re-insert with files so the manifest knows what it owns
        fixture
            .archives
            .insert(fixture.cache.path().join(&new.repo_path), new.clone());

        let mut host = fixture.host(MemoryCatalog::with_packages([new]));
        let mut job = JobSession::new(JobKind::Upgrade, &mut host);
        job.set_flags(JobFlags::PKG_VERSION_TEST);
        job.solve().unwrap();
        job.apply().unwrap();

        assert_eq!(fixture.db.package("misc/foo").unwrap().version, "2.0");
        // the path the new package also owns was kept
        assert_eq!(
            fixture.archives.deleted_files(),
            vec!["/usr/local/bin/foo"]
        );
        assert!(fixture.events.contains(&Event::UpgradeBegin {
            origin: "misc/foo".to_string(),
            version: "1.0".to_string(),
            new_version: "2.0".to_string(),
        }));
    }

    #[test]
    fn test_locked_local_aborts_and_rolls_back() {
        let fixture = ApplyFixture::new();
        let mut old = Package::new("misc/foo", "1.0");
        old.locked = true;
        fixture.db.add_package(old);
        let new = fixture.candidate("misc/foo", "2.0");

        let mut host = fixture.host(MemoryCatalog::with_packages([new]));
        let mut job = JobSession::new(JobKind::Upgrade, &mut host);
        job.set_flags(JobFlags::PKG_VERSION_TEST);
        job.solve().unwrap();

        // a locked package never plans, so plant the plan entry by hand
        // to exercise the applier's own guard
        assert_eq!(job.count(), 0);
        let mut forced = Package::new("misc/foo", "1.0");
        forced.new_version = Some("2.0".to_string());
        forced.repo_path = "All/foo-2.0.tgz".to_string();
        job.jobs.insert("misc/foo".to_string(), forced);

        assert!(matches!(job.apply(), Err(PkgError::Locked { .. })));
        assert!(fixture.events.contains(&Event::Locked {
            origin: "misc/foo".to_string()
        }));
        // rolled back, never committed
        let log = fixture.db.transaction_log();
        assert_eq!(log.last().unwrap(), "rollback upgrade");
        assert_eq!(fixture.db.package("misc/foo").unwrap().version, "1.0");
    }

    #[test]
    fn test_conflicting_local_is_displaced_before_install() {
        let fixture = ApplyFixture::new();
        let mut old = Package::new("misc/old-tool", "1.0");
        old.files.push(PkgFile::new("/usr/local/bin/tool"));
        fixture.db.add_package(old);

        let mut new = fixture.candidate("misc/new-tool", "1.0");
        new.files.push(PkgFile::new("/usr/local/bin/tool"));
        fixture
            .archives
            .insert(fixture.cache.path().join(&new.repo_path), new.clone());

        let mut host = fixture.host(MemoryCatalog::with_packages([new]));
        let mut job = JobSession::new(JobKind::Install, &mut host);
        job.set_flags(JobFlags::PKG_VERSION_TEST);
        job.add(MatchKind::Exact, &["misc/new-tool"]).unwrap();
        job.solve().unwrap();
        job.apply().unwrap();

        // the conflicting package lost its registration, the file it
        // shared with the replacement was kept on disk
        assert!(fixture.db.package("misc/old-tool").is_none());
        assert!(fixture.db.package("misc/new-tool").is_some());
        assert!(fixture.archives.deleted_files().is_empty());
    }

    #[test]
    fn test_skip_install_stops_after_fetch() {
        let fixture = ApplyFixture::new();
        let pkg = fixture.candidate("misc/foo", "1.0");
        let mut host = fixture.host(MemoryCatalog::with_packages([pkg.clone()]));

        let mut job = JobSession::new(JobKind::Install, &mut host);
        job.set_flags(JobFlags::PKG_VERSION_TEST | JobFlags::SKIP_INSTALL);
        job.add(MatchKind::Exact, &["misc/foo"]).unwrap();
        job.solve().unwrap();
        job.apply().unwrap();

        assert!(fixture.cache.path().join(&pkg.repo_path).exists());
        assert!(fixture.db.package("misc/foo").is_none());
        assert!(fixture.db.transaction_log().is_empty());
    }

    #[test]
    fn test_savepoint_reopens_between_clusters() {
        let fixture = ApplyFixture::new();
        let a = fixture.candidate("misc/a", "1.0");
        let b = fixture.candidate("misc/b", "1.0");
        let mut host = fixture.host(MemoryCatalog::with_packages([a, b]));

        let mut job = JobSession::new(JobKind::Install, &mut host);
        job.set_flags(JobFlags::PKG_VERSION_TEST);
        job.add(MatchKind::Glob, &["misc/*"]).unwrap();
        job.solve().unwrap();
        job.apply().unwrap();

        // two fresh installs, each its own cluster
        assert_eq!(
            fixture.db.transaction_log(),
            vec![
                "begin upgrade",
                "commit upgrade",
                "begin upgrade",
                "commit upgrade"
            ]
        );
    }

    #[test]
    fn test_deinstall_is_not_transactional() {
        let fixture = ApplyFixture::new();
        fixture.db.add_package(Package::new("misc/a", "1.0"));
        let mut locked = Package::new("misc/b", "1.0");
        locked.locked = true;
        fixture.db.add_package(locked);

        let mut host = fixture.host(MemoryCatalog::new());
        let mut job = JobSession::new(JobKind::Deinstall, &mut host);
        job.add(MatchKind::Glob, &["misc/*"]).unwrap();
        job.solve().unwrap();

        // the locked package fails the walk midway
        assert!(matches!(job.apply(), Err(PkgError::Locked { .. })));
        // but the first deletion already stands
        assert!(fixture.db.package("misc/a").is_none());
        assert!(fixture.db.transaction_log().is_empty());
    }

    #[test]
    fn test_deinstall_dry_run_deletes_nothing() {
        let fixture = ApplyFixture::new();
        fixture.db.add_package(Package::new("misc/a", "1.0"));

        let mut host = fixture.host(MemoryCatalog::new());
        let mut job = JobSession::new(JobKind::Deinstall, &mut host);
        job.set_flags(JobFlags::DRY_RUN);
        job.add(MatchKind::Exact, &["misc/a"]).unwrap();
        job.solve().unwrap();
        job.apply().unwrap();

        assert!(fixture.db.package("misc/a").is_some());
    }
}
