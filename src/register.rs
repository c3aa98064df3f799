// src/register.rs

//! Recording a staged package as installed
//!
//! Registration checks that every listed file is present below the
//! staging root, then writes the package in one transaction. Testing mode
//! skips the file check but still registers.

use crate::config::Config;
use crate::db::models;
use crate::error::{Error, Result};
use crate::package::{Attr, Package, PackageKind};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info, warn};

/// Register `pkg`, whose files are staged below `root`.
///
/// Missing files are warned about, and are fatal in developer mode. With
/// `testing` set the file check is skipped. Returns the install message to
/// show the user, if the package carries one.
pub fn register_package(
    conn: &mut Connection,
    pkg: &Package,
    root: &Path,
    testing: bool,
    config: &Config,
) -> Result<Option<String>> {
    if testing {
        debug!("Testing mode, not checking files below {}", root.display());
    } else {
        let missing = pkg.missing_files(root);
        for file in &missing {
            warn!("{} is listed but not present below {}", file.path, root.display());
        }
        if config.developer_mode && !missing.is_empty() {
            return Err(Error::IoError(format!(
                "{} listed files are missing below {}",
                missing.len(),
                root.display()
            )));
        }
    }

    let id = models::register(conn, pkg)?;
    info!(
        "Registered {}-{} as package {}",
        pkg.name().unwrap_or("?"),
        pkg.version().unwrap_or("?"),
        id
    );

    if pkg.kind == PackageKind::OldFile {
        return Ok(None);
    }
    Ok(pkg.get(Attr::Message).map(str::to_string))
}
