// src/lib.rs

//! pkgcore
//!
//! Metadata and archive-ingestion core of a binary package manager.
//!
//! # Architecture
//!
//! - Package entity: typed scalar attributes plus owned collections
//!   (deps, reverse deps, files, conflicts, scripts, execs, options)
//! - Ingestion: streams only the leading `+` control entries of a
//!   compressed tar archive into a package
//! - Resolution: tags each dependency as installed or not found against
//!   the local SQLite database
//! - Database-first: installed state lives in SQLite

pub mod archive;
pub mod config;
pub mod db;
mod error;
pub mod fetch;
pub mod manifest;
pub mod metadir;
pub mod package;
pub mod register;
pub mod resolver;

pub use archive::PackageReader;
pub use archive::create::{ArchiveFormat, PackageWriter};
pub use config::Config;
pub use error::{Error, Result};
pub use manifest::{JsonManifest, ManifestDecoder};
pub use package::{Attr, Package, PackageKind, ScriptPhase};
pub use register::register_package;
pub use resolver::{ResolveReport, resolve};
