// src/error.rs

use thiserror::Error;

/// Core error types for pkgcore
#[derive(Error, Debug)]
pub enum Error {
    /// A required argument was missing or malformed; names the parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors with the failing path already folded into the message
    #[error("I/O error: {0}")]
    IoError(String),

    /// The archive could not be opened or read as a package archive
    #[error("Archive error: {0}")]
    Archive(String),

    /// The manifest text could not be decoded
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Script file name does not map to a lifecycle phase
    #[error("Unknown script: {0}")]
    UnknownScript(String),

    /// Remote package fetch failed
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A package with the same origin is already registered
    #[error("Package already installed: {0}")]
    AlreadyInstalled(String),

    /// No registered package has the requested origin
    #[error("Package not installed: {0}")]
    NotInstalled(String),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),
}

/// Result type alias using pkgcore's Error type
pub type Result<T> = std::result::Result<T, Error>;
