//! Job sessions.
//!
//! A session collects user patterns for one job kind, solves them into a
//! dependency-ordered plan, and applies the plan against the database.
//! `bulk` is the working set of not-yet-ordered actions, `seen` holds
//! already-satisfied candidates to short-circuit re-lookups, and `jobs`
//! is the ordered plan; insertion order is the execution order.

mod apply;
mod fetch;
mod order;
mod solve;

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::db::MatchKind;
use crate::error::{PkgError, Result};
use crate::events::Event;
use crate::host::Host;
use crate::package::Package;
use crate::plugins::Hook;

/// The five job kinds a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Install,
    Deinstall,
    Fetch,
    Upgrade,
    Autoremove,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobKind::Install => "install",
            JobKind::Deinstall => "deinstall",
            JobKind::Fetch => "fetch",
            JobKind::Upgrade => "upgrade",
            JobKind::Autoremove => "autoremove",
        };
        write!(f, "{}", name)
    }
}

bitflags! {
    /// Behavior switches for a session.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct JobFlags: u32 {
        const DRY_RUN = 1 << 0;
        const RECURSIVE = 1 << 1;
        const FORCE = 1 << 2;
        const PKG_VERSION_TEST = 1 << 3;
        const WITH_DEPS = 1 << 4;
        const UPGRADES_FOR_INSTALLED = 1 << 5;
        const SKIP_INSTALL = 1 << 6;
        const NOSCRIPT = 1 << 7;
        const AUTOMATIC = 1 << 8;
    }
}

/// One user-supplied pattern and how to match it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPattern {
    pub pattern: String,
    pub kind: MatchKind,
}

/// A planning and application session for one job kind.
pub struct JobSession<'a> {
    host: &'a mut Host,
    kind: JobKind,
    flags: JobFlags,
    repo_name: Option<String>,
    patterns: Vec<JobPattern>,
    pub(crate) bulk: IndexMap<String, Package>,
    pub(crate) seen: IndexMap<String, Package>,
    pub(crate) jobs: IndexMap<String, Package>,
    solved: bool,
}

impl<'a> JobSession<'a> {
    pub fn new(kind: JobKind, host: &'a mut Host) -> Self {
        Self {
            host,
            kind,
            flags: JobFlags::empty(),
            repo_name: None,
            patterns: Vec::new(),
            bulk: IndexMap::new(),
            seen: IndexMap::new(),
            jobs: IndexMap::new(),
            solved: false,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn flags(&self) -> JobFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: JobFlags) {
        self.flags = flags;
    }

    pub fn set_repository(&mut self, name: impl Into<String>) {
        self.repo_name = Some(name.into());
    }

    pub fn solved(&self) -> bool {
        self.solved
    }

    /// Queue patterns for planning. Fails once the session is solved.
    pub fn add(&mut self, kind: MatchKind, patterns: &[&str]) -> Result<()> {
        if self.solved {
            self.host.events.post(&Event::Error {
                message: "The job has already been solved. Impossible to append new elements"
                    .to_string(),
            });
            return Err(PkgError::AlreadySolved);
        }
        for pattern in patterns {
            self.patterns.push(JobPattern {
                pattern: (*pattern).to_string(),
                kind,
            });
        }
        Ok(())
    }

    /// Plan the session. Acquires the exclusive database lock unless
    /// `DRY_RUN` is set; the lock is held until the session is dropped.
    /// Solving an already-solved session is a no-op.
    pub fn solve(&mut self) -> Result<()> {
        if self.solved {
            return Ok(());
        }

        if !self.flags.contains(JobFlags::DRY_RUN) {
            self.host.db.obtain_lock()?;
        }

        log::debug!("solving {} job", self.kind);
        match self.kind {
            JobKind::Autoremove => self.solve_autoremove(),
            JobKind::Deinstall => self.solve_deinstall(),
            JobKind::Upgrade => self.solve_upgrade(),
            JobKind::Install => self.solve_install(),
            JobKind::Fetch => self.solve_fetch(),
        }
    }

    /// Run the plan with the pre/post hooks of the job kind around it.
    pub fn apply(&mut self) -> Result<()> {
        if !self.solved {
            self.host.events.post(&Event::Error {
                message: "The jobs have not been solved".to_string(),
            });
            return Err(PkgError::NotSolved);
        }

        log::debug!("applying {} job with {} entries", self.kind, self.jobs.len());
        let (pre, post) = match self.kind {
            JobKind::Install => (Hook::PreInstall, Hook::PostInstall),
            JobKind::Deinstall => (Hook::PreDeinstall, Hook::PostDeinstall),
            JobKind::Fetch => (Hook::PreFetch, Hook::PostFetch),
            JobKind::Upgrade => (Hook::PreUpgrade, Hook::PostUpgrade),
            JobKind::Autoremove => (Hook::PreAutoremove, Hook::PostAutoremove),
        };

        self.host.plugins.run(pre);
        let result = match self.kind {
            JobKind::Install | JobKind::Upgrade => self.apply_install(),
            JobKind::Deinstall | JobKind::Autoremove => self.apply_deinstall(),
            JobKind::Fetch => self.fetch_jobs(),
        };
        self.host.plugins.run(post);

        result
    }

    /// The planned package at `origin`, if any.
    pub fn find(&self, origin: &str) -> Option<&Package> {
        self.jobs.get(origin)
    }

    /// Number of planned actions.
    pub fn count(&self) -> usize {
        self.jobs.len()
    }

    /// Planned packages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.jobs.values()
    }

    /// Shared tail of the solvers that drain `bulk` into `jobs`.
    pub(crate) fn order_and_finish(&mut self) -> Result<()> {
        self.seen.clear();
        while !self.bulk.is_empty() {
            self.order_pool()?;
        }
        self.solved = true;
        Ok(())
    }
}

impl Drop for JobSession<'_> {
    fn drop(&mut self) {
        if !self.flags.contains(JobFlags::DRY_RUN) {
            self.host.db.release_lock();
        }
    }
}
