//! Artifact fetching.
//!
//! A fetcher places the artifact for a package at
//! `cache_dir/repo_path`, verifying the recorded digest when the
//! catalog carries one.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{PkgError, Result};
use crate::package::Package;

/// Downloads repository artifacts into the cache directory.
pub trait Fetcher {
    fn fetch(&self, pkg: &Package, cache_dir: &Path) -> Result<()>;
}

/// Hex sha256 of a file.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn verify_digest(pkg: &Package, path: &Path) -> Result<()> {
    let Some(expected) = &pkg.sum else {
        return Ok(());
    };
    let actual = file_digest(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(PkgError::ChecksumMismatch {
            origin: pkg.origin.clone(),
        });
    }
    Ok(())
}

fn cache_target(pkg: &Package, cache_dir: &Path) -> Result<std::path::PathBuf> {
    let target = cache_dir.join(&pkg.repo_path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(target)
}

/// Fetcher copying artifacts out of a local repository directory.
/// Useful for `file://`-style mirrors and tests.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    repo_dir: std::path::PathBuf,
}

impl FileFetcher {
    pub fn new(repo_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, pkg: &Package, cache_dir: &Path) -> Result<()> {
        let source = self.repo_dir.join(&pkg.repo_path);
        let target = cache_target(pkg, cache_dir)?;
        log::debug!("copying {} to {}", source.display(), target.display());
        fs::copy(&source, &target).map_err(|err| PkgError::FetchFailed {
            origin: pkg.origin.clone(),
            reason: format!("{}: {}", source.display(), err),
        })?;
        verify_digest(pkg, &target)
    }
}

/// Fetcher downloading artifacts over HTTP(S) from a repository base
/// URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    base: Url,
}

impl HttpFetcher {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|err| PkgError::Config(format!("invalid repository url {}: {}", base, err)))?;
        Ok(Self {
            client: reqwest::blocking::Client::new(),
            base,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, pkg: &Package, cache_dir: &Path) -> Result<()> {
        let fetch_err = |reason: String| PkgError::FetchFailed {
            origin: pkg.origin.clone(),
            reason,
        };

        let url = self
            .base
            .join(&pkg.repo_path)
            .map_err(|err| fetch_err(err.to_string()))?;
        log::debug!("fetching {}", url);

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|err| fetch_err(err.to_string()))?;

        let target = cache_target(pkg, cache_dir)?;
        let mut file = File::create(&target)?;
        response
            .copy_to(&mut file)
            .map_err(|err| fetch_err(err.to_string()))?;

        verify_digest(pkg, &target)
    }
}
