// src/package/mod.rs

//! The package entity
//!
//! A [`Package`] carries scalar attributes, seven owned collections and a
//! [`PackageKind`] tag. Dependencies are themselves `Package` values, so a
//! package and its dependency entries form a strict tree of uniquely
//! owned nodes.

pub mod attr;
pub mod list;
pub mod records;

pub use attr::{Attr, Attributes, MTREE_HEADER};
pub use list::OwnedList;
pub use records::{Conflict, Exec, PackageFile, PkgOption, Script, ScriptPhase};

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Length of a hex-encoded SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// Where a package entity came from, or how it resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageKind {
    #[default]
    Undetermined,
    /// Materialized from a package archive
    File,
    /// Backed by a record in the local package database
    Installed,
    /// A dependency with no matching installed record
    NotFound,
    /// Legacy archive layout without a `+MANIFEST`
    OldFile,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::Undetermined => "undetermined",
            PackageKind::File => "file",
            PackageKind::Installed => "installed",
            PackageKind::NotFound => "not_found",
            PackageKind::OldFile => "old_file",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "undetermined" => Ok(PackageKind::Undetermined),
            "file" => Ok(PackageKind::File),
            "installed" => Ok(PackageKind::Installed),
            "not_found" => Ok(PackageKind::NotFound),
            "old_file" => Ok(PackageKind::OldFile),
            _ => Err(format!("Invalid package kind: {}", s)),
        }
    }
}

/// An installable package, or a dependency entry of one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    pub kind: PackageKind,
    attrs: Attributes,
    flatsize: Option<i64>,
    source_path: Option<PathBuf>,
    deps: OwnedList<Package>,
    rdeps: OwnedList<Package>,
    conflicts: OwnedList<Conflict>,
    files: OwnedList<PackageFile>,
    scripts: OwnedList<Script>,
    execs: OwnedList<Exec>,
    options: OwnedList<PkgOption>,
}

impl Package {
    /// Create an empty package of undetermined kind
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty package tagged with `kind`
    pub fn with_kind(kind: PackageKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Clear every attribute and collection so the entity can be reused.
    ///
    /// Collections keep their allocated capacity. The kind is left alone;
    /// whoever recycles the entity sets it.
    pub fn reset(&mut self) {
        self.attrs.clear();
        self.flatsize = None;
        self.source_path = None;
        self.deps.reset();
        self.rdeps.reset();
        self.conflicts.reset();
        self.files.reset();
        self.scripts.reset();
        self.execs.reset();
        self.options.reset();
    }

    pub fn get(&self, attr: Attr) -> Option<&str> {
        self.attrs.get(attr)
    }

    pub fn set(&mut self, attr: Attr, value: &str) -> Result<()> {
        self.attrs.set(attr, value)
    }

    pub fn set_from_file(&mut self, attr: Attr, path: impl AsRef<Path>) -> Result<()> {
        self.attrs.set_from_file(attr, path)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn name(&self) -> Option<&str> {
        self.get(Attr::Name)
    }

    pub fn version(&self) -> Option<&str> {
        self.get(Attr::Version)
    }

    pub fn origin(&self) -> Option<&str> {
        self.get(Attr::Origin)
    }

    pub fn flatsize(&self) -> Option<i64> {
        self.flatsize
    }

    /// Set the installed byte footprint; must be positive
    pub fn set_flatsize(&mut self, size: i64) -> Result<()> {
        if size <= 0 {
            return Err(Error::InvalidArgument("size"));
        }
        self.flatsize = Some(size);
        Ok(())
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn set_source_path(&mut self, path: impl Into<PathBuf>) {
        self.source_path = Some(path.into());
    }

    pub fn deps(&self) -> &[Package] {
        self.deps.as_slice()
    }

    pub fn deps_mut(&mut self) -> &mut [Package] {
        self.deps.as_mut_slice()
    }

    pub fn rdeps(&self) -> &[Package] {
        self.rdeps.as_slice()
    }

    pub fn conflicts(&self) -> &[Conflict] {
        self.conflicts.as_slice()
    }

    pub fn files(&self) -> &[PackageFile] {
        self.files.as_slice()
    }

    /// Listed files that do not exist below `root`
    pub fn missing_files(&self, root: &Path) -> Vec<&PackageFile> {
        self.files()
            .iter()
            .filter(|file| !root.join(file.path.trim_start_matches('/')).exists())
            .collect()
    }

    pub fn scripts(&self) -> &[Script] {
        self.scripts.as_slice()
    }

    pub fn execs(&self) -> &[Exec] {
        self.execs.as_slice()
    }

    pub fn options(&self) -> &[PkgOption] {
        self.options.as_slice()
    }

    /// Add a dependency entry. It starts out as [`PackageKind::NotFound`]
    /// until the resolver checks it against the database.
    pub fn add_dependency(&mut self, name: &str, origin: &str, version: &str) -> Result<()> {
        let dep = Self::relation(name, origin, version)?;
        self.deps.push(dep);
        Ok(())
    }

    /// Record a package that depends on this one
    pub fn add_reverse_dependency(&mut self, name: &str, origin: &str, version: &str) -> Result<()> {
        let rdep = Self::relation(name, origin, version)?;
        self.rdeps.push(rdep);
        Ok(())
    }

    fn relation(name: &str, origin: &str, version: &str) -> Result<Package> {
        require(name, "name")?;
        require(origin, "origin")?;
        require(version, "version")?;

        let mut pkg = Package::with_kind(PackageKind::NotFound);
        pkg.set(Attr::Name, name)?;
        pkg.set(Attr::Origin, origin)?;
        pkg.set(Attr::Version, version)?;
        Ok(pkg)
    }

    /// Add a shipped file; the hash must be a 64-character SHA-256 hex digest
    pub fn add_file(&mut self, path: &str, sha256: &str) -> Result<()> {
        require(path, "path")?;
        if sha256.len() != SHA256_HEX_LEN {
            return Err(Error::InvalidArgument("sha256"));
        }
        self.files.push(PackageFile {
            path: path.to_string(),
            sha256: sha256.to_string(),
        });
        Ok(())
    }

    pub fn add_conflict(&mut self, glob: &str) -> Result<()> {
        require(glob, "glob")?;
        self.conflicts.push(Conflict {
            glob: glob.to_string(),
        });
        Ok(())
    }

    pub fn add_option(&mut self, name: &str, value: &str) -> Result<()> {
        require(name, "opt")?;
        require(value, "value")?;
        self.options.push(PkgOption {
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    pub fn add_exec(&mut self, cmd: &str, phase: ScriptPhase) -> Result<()> {
        require(cmd, "cmd")?;
        self.execs.push(Exec {
            cmd: cmd.to_string(),
            phase,
        });
        Ok(())
    }

    /// Append a script body for `phase`. An empty body is kept as-is.
    pub fn add_script(&mut self, body: impl Into<String>, phase: ScriptPhase) {
        self.scripts.push(Script {
            phase,
            body: body.into(),
        });
    }

    /// Load a script file, taking its phase from the file's base name
    /// (`pkg-post-install`, `+PRE_DEINSTALL`, ...).
    pub fn add_script_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(Error::InvalidArgument("path"))?;
        let phase = ScriptPhase::from_file_name(file_name)
            .ok_or_else(|| Error::UnknownScript(file_name.to_string()))?;

        let body = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

        self.scripts.ensure_capacity(6);
        self.add_script(body, phase);
        Ok(())
    }

    /// The script for `phase`, if any
    pub fn script(&self, phase: ScriptPhase) -> Option<&Script> {
        self.scripts.iter().find(|s| s.phase == phase)
    }
}

fn require(value: &str, param: &'static str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(param));
    }
    Ok(())
}
