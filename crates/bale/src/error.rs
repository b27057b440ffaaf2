use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PkgError {
    // Session state errors
    #[error("The job has already been solved; impossible to append new elements")]
    AlreadySolved,

    #[error("The jobs have not been solved")]
    NotSolved,

    // Planning errors
    #[error("No packages matching '{pattern}' found in the repositories")]
    NotFound { pattern: String },

    #[error("Missing dependency matching '{origin}'")]
    MissingDependency { origin: String },

    #[error("Error while ordering the jobs: circular dependency")]
    CircularDependency,

    // Apply errors
    #[error("Package '{origin}' is locked and may not be modified")]
    Locked { origin: String },

    #[error("Not enough space in {}, needed {needed} available {available}", .cache_dir.display())]
    NoSpace {
        cache_dir: PathBuf,
        needed: String,
        available: String,
    },

    #[error("Integrity check failed")]
    Integrity,

    // Collaborator errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Fetch failed for {origin}: {reason}")]
    FetchFailed { origin: String, reason: String },

    #[error("Checksum mismatch for {origin}")]
    ChecksumMismatch { origin: String },

    #[error("Script failure: {0}")]
    Script(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PkgError>;
