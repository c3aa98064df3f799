// src/resolver.rs

//! Dependency resolution against the local package database
//!
//! Each dependency is looked up by exact origin. The outcome is written to
//! the dependency's [`PackageKind`]: `Installed` when a record exists,
//! `NotFound` otherwise. A failed lookup degrades that one dependency to
//! `NotFound` instead of aborting the walk; the returned [`ResolveReport`]
//! and the `warn` log keep degraded lookups apart from genuine misses.

use crate::db::models::InstalledPackage;
use crate::error::Result;
use crate::package::{Package, PackageKind};
use tracing::{debug, warn};

/// How an origin argument is matched against installed records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    /// Shell-style glob (`*`, `?`, `[...]`)
    Glob,
}

/// Read access to installed package records
pub trait PackageDatabase {
    /// Find at most one installed record whose origin matches
    fn lookup_by_origin(&self, origin: &str, mode: MatchMode) -> Result<Option<InstalledPackage>>;
}

/// Tally of one resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub installed: usize,
    pub missing: usize,
    /// Lookups that failed and were recorded as not found
    pub degraded: usize,
}

impl ResolveReport {
    pub fn all_installed(&self) -> bool {
        self.missing == 0 && self.degraded == 0
    }
}

/// Tag every dependency of `pkg` with whether it is installed.
///
/// Only the dependencies' kinds change; their name, origin and version
/// are left as they are. Lookups run in dependency order and nothing is
/// cached between calls.
pub fn resolve(pkg: &mut Package, db: &dyn PackageDatabase) -> ResolveReport {
    let mut report = ResolveReport::default();

    for dep in pkg.deps_mut() {
        let Some(origin) = dep.origin() else {
            dep.kind = PackageKind::NotFound;
            report.missing += 1;
            continue;
        };

        let kind = match db.lookup_by_origin(origin, MatchMode::Exact) {
            Ok(Some(record)) => {
                debug!("{} satisfied by {}-{}", origin, record.name, record.version);
                report.installed += 1;
                PackageKind::Installed
            }
            Ok(None) => {
                debug!("{} is not installed", origin);
                report.missing += 1;
                PackageKind::NotFound
            }
            Err(e) => {
                warn!("Lookup of {} failed, treating as not found: {}", origin, e);
                report.degraded += 1;
                PackageKind::NotFound
            }
        };
        dep.kind = kind;
    }

    report
}

/// Installed packages matching one of `pkg`'s conflict globs
pub fn find_conflicts(pkg: &Package, db: &dyn PackageDatabase) -> Result<Vec<InstalledPackage>> {
    let mut found = Vec::new();
    for conflict in pkg.conflicts() {
        if let Some(record) = db.lookup_by_origin(&conflict.glob, MatchMode::Glob)? {
            debug!("{} conflicts with installed {}", conflict.glob, record.origin);
            found.push(record);
        }
    }
    Ok(found)
}
