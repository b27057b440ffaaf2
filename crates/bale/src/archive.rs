//! Package archive reading and installation.
//!
//! Artifacts are tarballs (`.txz`, `.tgz`, or plain `.tar`) carrying a
//! `+MANIFEST` JSON document alongside the payload files. [`DiskArchives`]
//! is the stock implementation installing into a root directory.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use crate::db::{AddFlags, Database};
use crate::error::{PkgError, Result};
use crate::package::Package;
use crate::scripts::{ScriptKind, ScriptRunner, ShellScripts};

/// Name of the manifest entry inside an artifact.
pub const MANIFEST_NAME: &str = "+MANIFEST";

/// Opens on-disk archives and moves their contents in and out of the
/// installed tree.
pub trait ArchiveSource {
    /// Read the manifest of the archive at `path`.
    fn open(&self, path: &Path) -> Result<Package>;

    /// Install the archive: extract the payload, run install scripts per
    /// the flags, and register the package.
    fn add(&self, db: &mut dyn Database, path: &Path, flags: AddFlags) -> Result<()>;

    /// Remove the files owned by a displaced package. Entries flagged
    /// `keep` are skipped. With `force`, individual failures are logged
    /// and skipped instead of aborting.
    fn delete_files(&self, pkg: &Package, force: bool) -> Result<()>;

    /// Remove the directories owned by a displaced package. Non-empty
    /// directories survive, which is what keeps paths shared with other
    /// packages alive.
    fn delete_dirs(&self, pkg: &Package) -> Result<()>;
}

/// Archive source working against a filesystem root.
pub struct DiskArchives {
    root: PathBuf,
    runner: Box<dyn ScriptRunner>,
}

impl DiskArchives {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            runner: Box::new(ShellScripts),
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn ScriptRunner>) -> Self {
        self.runner = runner;
        self
    }

    fn reader(path: &Path) -> Result<Box<dyn Read>> {
        let file = File::open(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let reader: Box<dyn Read> = match ext {
            "txz" | "xz" => Box::new(XzDecoder::new(file)),
            "tgz" | "gz" => Box::new(GzDecoder::new(file)),
            _ => Box::new(file),
        };
        Ok(reader)
    }

    fn target(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl ArchiveSource for DiskArchives {
    fn open(&self, path: &Path) -> Result<Package> {
        let mut archive = tar::Archive::new(Self::reader(path)?);
        for entry in archive.entries()? {
            let entry = entry?;
            if entry.path()?.as_os_str() == MANIFEST_NAME {
                return serde_json::from_reader(entry).map_err(|err| {
                    PkgError::Archive(format!(
                        "malformed manifest in {}: {}",
                        path.display(),
                        err
                    ))
                });
            }
        }
        Err(PkgError::Archive(format!(
            "no manifest found in {}",
            path.display()
        )))
    }

    fn add(&self, db: &mut dyn Database, path: &Path, flags: AddFlags) -> Result<()> {
        let mut pkg = self.open(path)?;
        log::debug!("installing {} from {}", pkg.label(), path.display());

        if !flags.contains(AddFlags::NOSCRIPT) {
            self.runner.run(&pkg, ScriptKind::PreInstall)?;
        }

        std::fs::create_dir_all(&self.root)?;
        let mut archive = tar::Archive::new(Self::reader(path)?);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            if name.starts_with('+') {
                continue;
            }
            // unpack_in refuses paths escaping the root
            if !entry.unpack_in(&self.root)? {
                return Err(PkgError::Archive(format!(
                    "refusing to unpack {} outside the root",
                    name
                )));
            }
        }

        pkg.automatic = flags.contains(AddFlags::AUTOMATIC);
        db.register(pkg.clone())?;

        if !flags.contains(AddFlags::NOSCRIPT) {
            self.runner.run(&pkg, ScriptKind::PostInstall)?;
        }

        Ok(())
    }

    fn delete_files(&self, pkg: &Package, force: bool) -> Result<()> {
        for file in &pkg.files {
            if file.keep {
                continue;
            }
            let target = self.target(&file.path);
            if let Err(err) = std::fs::remove_file(&target) {
                if !force {
                    return Err(PkgError::Io(err));
                }
                log::warn!("could not remove {}: {}", target.display(), err);
            }
        }
        Ok(())
    }

    fn delete_dirs(&self, pkg: &Package) -> Result<()> {
        for dir in &pkg.dirs {
            if dir.keep {
                continue;
            }
            let target = self.target(&dir.path);
            if let Err(err) = std::fs::remove_dir(&target) {
                log::trace!("leaving {}: {}", target.display(), err);
            }
        }
        Ok(())
    }
}
