// src/db/models.rs

//! Data models for installed package records
//!
//! [`InstalledPackage`] maps onto the `packages` table. Its dependent
//! rows (deps, files, scripts, ...) are written by [`register`] and read
//! back by [`InstalledPackage::to_package`].

use crate::db;
use crate::error::{Error, Result};
use crate::package::{Attr, Package, PackageKind, ScriptPhase};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashSet;
use tracing::{debug, info, warn};

const COLUMNS: &str = "id, origin, name, version, comment, desc, mtree, message, arch, \
                       osversion, maintainer, www, prefix, flatsize, installed_at";

/// A row of the `packages` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub id: Option<i64>,
    pub origin: String,
    pub name: String,
    pub version: String,
    pub comment: Option<String>,
    pub desc: Option<String>,
    pub mtree: Option<String>,
    pub message: Option<String>,
    pub arch: Option<String>,
    pub osversion: Option<String>,
    pub maintainer: Option<String>,
    pub www: Option<String>,
    pub prefix: Option<String>,
    pub flatsize: Option<i64>,
    pub installed_at: Option<String>,
}

impl InstalledPackage {
    /// Create a new record with only the identifying fields set
    pub fn new(origin: String, name: String, version: String) -> Self {
        Self {
            id: None,
            origin,
            name,
            version,
            comment: None,
            desc: None,
            mtree: None,
            message: None,
            arch: None,
            osversion: None,
            maintainer: None,
            www: None,
            prefix: None,
            flatsize: None,
            installed_at: None,
        }
    }

    /// Build a record from a package's scalar attributes.
    ///
    /// Name, origin and version are required.
    pub fn from_package(pkg: &Package) -> Result<Self> {
        let origin = pkg.origin().ok_or(Error::InvalidArgument("origin"))?;
        let name = pkg.name().ok_or(Error::InvalidArgument("name"))?;
        let version = pkg.version().ok_or(Error::InvalidArgument("version"))?;

        let owned = |attr: Attr| pkg.get(attr).map(str::to_string);
        Ok(Self {
            comment: owned(Attr::Comment),
            desc: owned(Attr::Desc),
            mtree: owned(Attr::Mtree),
            message: owned(Attr::Message),
            arch: owned(Attr::Arch),
            osversion: owned(Attr::OsVersion),
            maintainer: owned(Attr::Maintainer),
            www: owned(Attr::Www),
            prefix: owned(Attr::Prefix),
            flatsize: pkg.flatsize(),
            ..Self::new(origin.to_string(), name.to_string(), version.to_string())
        })
    }

    /// Insert this package into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (origin, name, version, comment, desc, mtree, message, arch,
                                   osversion, maintainer, www, prefix, flatsize)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &self.origin,
                &self.name,
                &self.version,
                &self.comment,
                &self.desc,
                &self.mtree,
                &self.message,
                &self.arch,
                &self.osversion,
                &self.maintainer,
                &self.www,
                &self.prefix,
                &self.flatsize,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a package by its exact origin
    pub fn find_by_origin(conn: &Connection, origin: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE origin = ?1",
            COLUMNS
        ))?;

        let pkg = stmt.query_row([origin], Self::from_row).optional()?;

        Ok(pkg)
    }

    /// Find the first package (by origin order) whose origin matches a
    /// shell-style glob
    pub fn find_by_origin_glob(conn: &Connection, pattern: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE origin GLOB ?1 ORDER BY origin LIMIT 1",
            COLUMNS
        ))?;

        let pkg = stmt.query_row([pattern], Self::from_row).optional()?;

        Ok(pkg)
    }

    /// List all installed packages
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages ORDER BY origin",
            COLUMNS
        ))?;

        let pkgs = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pkgs)
    }

    /// Delete a package by ID; dependent rows cascade
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Load the full package entity behind this record, tagged
    /// [`PackageKind::Installed`].
    ///
    /// Reverse dependencies are the installed packages whose deps name
    /// this record's origin.
    pub fn to_package(&self, conn: &Connection) -> Result<Package> {
        let id = self.id.ok_or(Error::InvalidArgument("id"))?;
        let mut pkg = Package::with_kind(PackageKind::Installed);

        pkg.set(Attr::Origin, &self.origin)?;
        pkg.set(Attr::Name, &self.name)?;
        pkg.set(Attr::Version, &self.version)?;
        let optional = [
            (Attr::Comment, &self.comment),
            (Attr::Desc, &self.desc),
            (Attr::Mtree, &self.mtree),
            (Attr::Message, &self.message),
            (Attr::Arch, &self.arch),
            (Attr::OsVersion, &self.osversion),
            (Attr::Maintainer, &self.maintainer),
            (Attr::Www, &self.www),
            (Attr::Prefix, &self.prefix),
        ];
        for (attr, value) in optional {
            if let Some(value) = value {
                pkg.set(attr, value)?;
            }
        }
        if let Some(size) = self.flatsize {
            pkg.set_flatsize(size)?;
        }

        let mut stmt =
            conn.prepare("SELECT name, origin, version FROM deps WHERE package_id = ?1 ORDER BY id")?;
        let deps = stmt
            .query_map([id], triple)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (name, origin, version) in deps {
            pkg.add_dependency(&name, &origin, &version)?;
        }

        let mut stmt = conn.prepare(
            "SELECT p.name, p.origin, p.version FROM deps d
             JOIN packages p ON p.id = d.package_id
             WHERE d.origin = ?1 ORDER BY p.origin",
        )?;
        let rdeps = stmt
            .query_map([&self.origin], triple)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (name, origin, version) in rdeps {
            pkg.add_reverse_dependency(&name, &origin, &version)?;
        }

        let mut stmt =
            conn.prepare("SELECT path, sha256 FROM files WHERE package_id = ?1 ORDER BY id")?;
        let files = stmt
            .query_map([id], pair)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (path, sha256) in files {
            pkg.add_file(&path, &sha256)?;
        }

        let mut stmt = conn.prepare("SELECT glob FROM conflicts WHERE package_id = ?1 ORDER BY id")?;
        let globs = stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for glob in globs {
            pkg.add_conflict(&glob)?;
        }

        let mut stmt =
            conn.prepare("SELECT name, value FROM options WHERE package_id = ?1 ORDER BY id")?;
        let options = stmt
            .query_map([id], pair)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (name, value) in options {
            pkg.add_option(&name, &value)?;
        }

        let mut stmt =
            conn.prepare("SELECT phase, body FROM scripts WHERE package_id = ?1 ORDER BY id")?;
        let scripts = stmt
            .query_map([id], pair)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (phase, body) in scripts {
            pkg.add_script(body, parse_phase(&phase)?);
        }

        let mut stmt = conn.prepare("SELECT cmd, phase FROM execs WHERE package_id = ?1 ORDER BY id")?;
        let execs = stmt
            .query_map([id], pair)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (cmd, phase) in execs {
            pkg.add_exec(&cmd, parse_phase(&phase)?)?;
        }

        Ok(pkg)
    }

    /// Convert a database row to an InstalledPackage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            origin: row.get(1)?,
            name: row.get(2)?,
            version: row.get(3)?,
            comment: row.get(4)?,
            desc: row.get(5)?,
            mtree: row.get(6)?,
            message: row.get(7)?,
            arch: row.get(8)?,
            osversion: row.get(9)?,
            maintainer: row.get(10)?,
            www: row.get(11)?,
            prefix: row.get(12)?,
            flatsize: row.get(13)?,
            installed_at: row.get(14)?,
        })
    }
}

fn pair(row: &Row) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn triple(row: &Row) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn parse_phase(s: &str) -> Result<ScriptPhase> {
    s.parse()
        .map_err(|e: String| Error::IoError(format!("Corrupt script phase in database: {}", e)))
}

/// Record `pkg` and all of its collections as installed, atomically.
///
/// Fails with [`Error::AlreadyInstalled`] if a package with the same
/// origin is already registered, and with `InvalidArgument("deps")` if a
/// dependency origin is listed twice.
pub fn register(conn: &mut Connection, pkg: &Package) -> Result<i64> {
    let mut record = InstalledPackage::from_package(pkg)?;

    let mut seen = HashSet::new();
    if let Some(dup) = pkg.deps().iter().filter_map(|d| d.origin()).find(|o| !seen.insert(*o)) {
        warn!("{} lists dependency {} more than once", record.origin, dup);
        return Err(Error::InvalidArgument("deps"));
    }

    if let Some(existing) = InstalledPackage::find_by_origin(conn, &record.origin)? {
        return Err(Error::AlreadyInstalled(format!(
            "{}-{} ({})",
            existing.name, existing.version, existing.origin
        )));
    }

    let id = db::transaction(conn, |tx| {
        let id = record.insert(tx)?;

        for dep in pkg.deps() {
            tx.execute(
                "INSERT INTO deps (package_id, name, origin, version) VALUES (?1, ?2, ?3, ?4)",
                params![id, dep.name(), dep.origin(), dep.version()],
            )?;
        }
        for file in pkg.files() {
            tx.execute(
                "INSERT INTO files (package_id, path, sha256) VALUES (?1, ?2, ?3)",
                params![id, &file.path, &file.sha256],
            )?;
        }
        for conflict in pkg.conflicts() {
            tx.execute(
                "INSERT INTO conflicts (package_id, glob) VALUES (?1, ?2)",
                params![id, &conflict.glob],
            )?;
        }
        for option in pkg.options() {
            tx.execute(
                "INSERT INTO options (package_id, name, value) VALUES (?1, ?2, ?3)",
                params![id, &option.name, &option.value],
            )?;
        }
        for script in pkg.scripts() {
            tx.execute(
                "INSERT INTO scripts (package_id, phase, body) VALUES (?1, ?2, ?3)",
                params![id, script.phase.as_str(), &script.body],
            )?;
        }
        for exec in pkg.execs() {
            tx.execute(
                "INSERT INTO execs (package_id, cmd, phase) VALUES (?1, ?2, ?3)",
                params![id, &exec.cmd, exec.phase.as_str()],
            )?;
        }
        Ok(id)
    })?;

    info!(
        "Registered {}-{} ({})",
        record.name, record.version, record.origin
    );
    debug!(
        "{} deps, {} files, {} scripts recorded",
        pkg.deps().len(),
        pkg.files().len(),
        pkg.scripts().len()
    );
    Ok(id)
}
