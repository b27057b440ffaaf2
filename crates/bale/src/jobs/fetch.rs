//! Fetch driver.
//!
//! Sizes the download against what is already cached, refuses to start
//! without enough free space, pulls every artifact, then stages the
//! archives for the database integrity check.

use indicatif::HumanBytes;

use super::{JobFlags, JobSession};
use crate::error::{PkgError, Result};
use crate::events::Event;

impl JobSession<'_> {
    pub(crate) fn fetch_jobs(&mut self) -> Result<()> {
        let cache_dir = self.host.config.cache_dir.clone();

        // bytes still to download; partially cached artifacts only count
        // the remainder
        let mut dlsize: i64 = 0;
        for pkg in self.jobs.values() {
            let cached = cache_dir.join(&pkg.repo_path);
            match std::fs::metadata(&cached) {
                Ok(meta) => dlsize += pkg.pkg_size - meta.len() as i64,
                Err(_) => dlsize += pkg.pkg_size,
            }
        }

        let stat = loop {
            match rustix::fs::statvfs(&cache_dir) {
                Ok(stat) => break stat,
                Err(rustix::io::Errno::NOENT) => std::fs::create_dir_all(&cache_dir)?,
                Err(errno) => {
                    self.host.events.post(&Event::Errno {
                        syscall: "statvfs".to_string(),
                        arg: cache_dir.display().to_string(),
                    });
                    return Err(PkgError::Io(errno.into()));
                }
            }
        };

        let available = stat.f_bsize.saturating_mul(stat.f_bfree).min(i64::MAX as u64) as i64;
        if dlsize > available {
            let needed = HumanBytes(dlsize.unsigned_abs()).to_string();
            let free = HumanBytes(available.unsigned_abs()).to_string();
            self.host.events.post(&Event::Error {
                message: format!(
                    "Not enough space in {}, needed {} available {}",
                    cache_dir.display(),
                    needed,
                    free
                ),
            });
            return Err(PkgError::NoSpace {
                cache_dir,
                needed,
                available: free,
            });
        }

        if self.flags.contains(JobFlags::DRY_RUN) {
            return Ok(());
        }

        for pkg in self.jobs.values() {
            self.host.fetcher.fetch(pkg, &cache_dir)?;
        }

        // open everything we fetched and let the database accumulate
        // conflicts before failing
        self.host.events.post(&Event::IntegrityCheckBegin);
        let mut failed = false;
        for pkg in self.jobs.values() {
            let path = cache_dir.join(&pkg.repo_path);
            match self.host.archives.open(&path) {
                Ok(staged) => {
                    if let Err(err) = self.host.db.integrity_append(&staged) {
                        log::warn!("could not stage {}: {}", staged.label(), err);
                        failed = true;
                    }
                }
                Err(err) => {
                    log::warn!("could not open {}: {}", path.display(), err);
                    failed = true;
                }
            }
        }

        self.host.db.integrity_check()?;
        if failed {
            return Err(PkgError::Integrity);
        }
        self.host.events.post(&Event::IntegrityCheckFinished);

        Ok(())
    }
}
