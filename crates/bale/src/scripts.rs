//! Lifecycle script execution.
//!
//! Packages carry shell script bodies keyed by lifecycle stage; the
//! applier runs the deinstall pair around displacement and archive
//! installers run the install pair. Service control for displaced
//! packages goes through the same runner.

use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{PkgError, Result};
use crate::package::Package;

/// Lifecycle stages a package may carry a script for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptKind {
    PreInstall,
    PostInstall,
    PreDeinstall,
    PostDeinstall,
    PreUpgrade,
    PostUpgrade,
}

impl ScriptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::PreInstall => "pre-install",
            ScriptKind::PostInstall => "post-install",
            ScriptKind::PreDeinstall => "pre-deinstall",
            ScriptKind::PostDeinstall => "post-deinstall",
            ScriptKind::PreUpgrade => "pre-upgrade",
            ScriptKind::PostUpgrade => "post-upgrade",
        }
    }
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runs lifecycle scripts and controls services owned by a package.
pub trait ScriptRunner {
    /// Run the script of the given stage, if the package carries one.
    fn run(&self, pkg: &Package, kind: ScriptKind) -> Result<()>;

    /// Stop any running services owned by the package.
    fn stop_services(&self, pkg: &Package) -> Result<()>;
}

/// Runner that executes nothing. Useful for stores without a real root.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScripts;

impl ScriptRunner for NullScripts {
    fn run(&self, _pkg: &Package, _kind: ScriptKind) -> Result<()> {
        Ok(())
    }

    fn stop_services(&self, _pkg: &Package) -> Result<()> {
        Ok(())
    }
}

/// Runner spawning `/bin/sh -c` with the package identity in the
/// environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellScripts;

impl ShellScripts {
    fn spawn(&self, pkg: &Package, body: &str) -> Result<std::process::ExitStatus> {
        Command::new("/bin/sh")
            .arg("-c")
            .arg(body)
            .env("PKG_ORIGIN", &pkg.origin)
            .env("PKG_NAME", &pkg.name)
            .env("PKG_VERSION", &pkg.version)
            .status()
            .map_err(PkgError::Io)
    }
}

impl ScriptRunner for ShellScripts {
    fn run(&self, pkg: &Package, kind: ScriptKind) -> Result<()> {
        let Some(body) = pkg.scripts.get(&kind) else {
            return Ok(());
        };
        log::debug!("running {} script for {}", kind, pkg.label());
        let status = self.spawn(pkg, body)?;
        if !status.success() {
            return Err(PkgError::Script(format!(
                "{} script for {} exited with {}",
                kind,
                pkg.label(),
                status
            )));
        }
        Ok(())
    }

    fn stop_services(&self, pkg: &Package) -> Result<()> {
        // rc scripts live among the package files; ask each to stop and
        // tolerate the ones that are not running
        for file in &pkg.files {
            if !file.path.contains("/etc/rc.d/") {
                continue;
            }
            log::debug!("stopping service {}", file.path);
            let status = self.spawn(pkg, &format!("{} stop", file.path))?;
            if !status.success() {
                log::warn!("service {} did not stop cleanly", file.path);
            }
        }
        Ok(())
    }
}
