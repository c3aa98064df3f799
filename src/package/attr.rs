// src/package/attr.rs

//! Scalar package metadata keyed by a closed attribute enum

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Header every stored mtree specification starts with
pub const MTREE_HEADER: &str = "#mtree";

/// Recognized scalar attribute keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    Name,
    Version,
    Comment,
    Origin,
    Desc,
    Mtree,
    Message,
    Arch,
    OsVersion,
    Maintainer,
    Www,
    Prefix,
}

impl Attr {
    pub const ALL: [Attr; 12] = [
        Attr::Name,
        Attr::Version,
        Attr::Comment,
        Attr::Origin,
        Attr::Desc,
        Attr::Mtree,
        Attr::Message,
        Attr::Arch,
        Attr::OsVersion,
        Attr::Maintainer,
        Attr::Www,
        Attr::Prefix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attr::Name => "name",
            Attr::Version => "version",
            Attr::Comment => "comment",
            Attr::Origin => "origin",
            Attr::Desc => "desc",
            Attr::Mtree => "mtree",
            Attr::Message => "message",
            Attr::Arch => "arch",
            Attr::OsVersion => "osversion",
            Attr::Maintainer => "maintainer",
            Attr::Www => "www",
            Attr::Prefix => "prefix",
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Attr::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or(Error::InvalidArgument("attr"))
    }
}

/// Typed storage for a package's scalar attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    name: Option<String>,
    version: Option<String>,
    comment: Option<String>,
    origin: Option<String>,
    desc: Option<String>,
    mtree: Option<String>,
    message: Option<String>,
    arch: Option<String>,
    osversion: Option<String>,
    maintainer: Option<String>,
    www: Option<String>,
    prefix: Option<String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attr: Attr) -> Option<&str> {
        self.slot(attr).as_deref()
    }

    /// Store `value` under `attr`.
    ///
    /// The mtree attribute always ends up starting with [`MTREE_HEADER`];
    /// content lacking it gets the header line prepended.
    pub fn set(&mut self, attr: Attr, value: &str) -> Result<()> {
        let value = match attr {
            Attr::Mtree if !value.starts_with(MTREE_HEADER) => {
                format!("{}\n{}", MTREE_HEADER, value)
            }
            _ => value.to_string(),
        };
        *self.slot_mut(attr) = Some(value);
        Ok(())
    }

    /// Store a value under an attribute given by its textual key
    pub fn set_named(&mut self, key: &str, value: &str) -> Result<()> {
        let attr: Attr = key.parse()?;
        self.set(attr, value)
    }

    /// Read a whole file and store its content under `attr`.
    ///
    /// Nothing is stored if the file cannot be read completely.
    pub fn set_from_file(&mut self, attr: Attr, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        self.set(attr, &content)
    }

    pub fn unset(&mut self, attr: Attr) {
        *self.slot_mut(attr) = None;
    }

    pub fn clear(&mut self) {
        for attr in Attr::ALL {
            self.unset(attr);
        }
    }

    fn slot(&self, attr: Attr) -> &Option<String> {
        match attr {
            Attr::Name => &self.name,
            Attr::Version => &self.version,
            Attr::Comment => &self.comment,
            Attr::Origin => &self.origin,
            Attr::Desc => &self.desc,
            Attr::Mtree => &self.mtree,
            Attr::Message => &self.message,
            Attr::Arch => &self.arch,
            Attr::OsVersion => &self.osversion,
            Attr::Maintainer => &self.maintainer,
            Attr::Www => &self.www,
            Attr::Prefix => &self.prefix,
        }
    }

    fn slot_mut(&mut self, attr: Attr) -> &mut Option<String> {
        match attr {
            Attr::Name => &mut self.name,
            Attr::Version => &mut self.version,
            Attr::Comment => &mut self.comment,
            Attr::Origin => &mut self.origin,
            Attr::Desc => &mut self.desc,
            Attr::Mtree => &mut self.mtree,
            Attr::Message => &mut self.message,
            Attr::Arch => &mut self.arch,
            Attr::OsVersion => &mut self.osversion,
            Attr::Maintainer => &mut self.maintainer,
            Attr::Www => &mut self.www,
            Attr::Prefix => &mut self.prefix,
        }
    }
}
