// src/archive/create.rs

//! Writing package archives
//!
//! Control entries come first (`+MANIFEST`, `+DESC`, `+DISPLAY`,
//! `+MTREE_DIRS`, scripts), followed by the payload files taken from a
//! staging root. This is the layout [`super::PackageReader`] consumes.

use super::{DESC_NAME, DISPLAY_NAME, MANIFEST_NAME, MTREE_NAME};
use crate::config::Config;
use crate::db::models::InstalledPackage;
use crate::error::{Error, Result};
use crate::manifest::ManifestDoc;
use crate::package::{Attr, Package};
use flate2::write::GzEncoder;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tar::{Builder, Header};
use tracing::{debug, info, warn};
use xz2::write::XzEncoder;

/// Output container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    Tar,
    Tgz,
    #[default]
    Txz,
    Tzst,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Tgz => "tgz",
            ArchiveFormat::Txz => "txz",
            ArchiveFormat::Tzst => "tzst",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tar" => Ok(ArchiveFormat::Tar),
            "tgz" => Ok(ArchiveFormat::Tgz),
            "txz" => Ok(ArchiveFormat::Txz),
            "tzst" => Ok(ArchiveFormat::Tzst),
            _ => Err(format!("Invalid archive format: {}", s)),
        }
    }
}

/// Compressing writer that can be finished explicitly
enum Compressor {
    Plain(File),
    Gzip(GzEncoder<File>),
    Xz(XzEncoder<File>),
    Zstd(zstd::Encoder<'static, File>),
}

impl Compressor {
    fn new(format: ArchiveFormat, file: File) -> io::Result<Self> {
        Ok(match format {
            ArchiveFormat::Tar => Compressor::Plain(file),
            ArchiveFormat::Tgz => Compressor::Gzip(GzEncoder::new(file, flate2::Compression::default())),
            ArchiveFormat::Txz => Compressor::Xz(XzEncoder::new(file, 6)),
            ArchiveFormat::Tzst => Compressor::Zstd(zstd::Encoder::new(file, 0)?),
        })
    }

    fn finish(self) -> io::Result<File> {
        match self {
            Compressor::Plain(file) => Ok(file),
            Compressor::Gzip(enc) => enc.finish(),
            Compressor::Xz(enc) => enc.finish(),
            Compressor::Zstd(enc) => enc.finish(),
        }
    }
}

impl Write for Compressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Compressor::Plain(w) => w.write(buf),
            Compressor::Gzip(w) => w.write(buf),
            Compressor::Xz(w) => w.write(buf),
            Compressor::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Compressor::Plain(w) => w.flush(),
            Compressor::Gzip(w) => w.flush(),
            Compressor::Xz(w) => w.flush(),
            Compressor::Zstd(w) => w.flush(),
        }
    }
}

/// SHA-256 of a file's content as lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Every regular file below `root`, as absolute package paths, sorted
fn walk_tree(root: &Path) -> Result<Vec<String>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", dir.display(), e)))?;
        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                if let Ok(rel) = path.strip_prefix(root) {
                    found.push(format!("/{}", rel.to_string_lossy()));
                }
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Writes packages out as archives
pub struct PackageWriter {
    format: ArchiveFormat,
    developer_mode: bool,
}

impl PackageWriter {
    pub fn new(format: ArchiveFormat, config: &Config) -> Self {
        Self {
            format,
            developer_mode: config.developer_mode,
        }
    }

    /// Archive path for `pkg` inside `outdir`
    pub fn output_path(&self, pkg: &Package, outdir: &Path) -> Result<PathBuf> {
        let name = pkg.name().ok_or(Error::InvalidArgument("name"))?;
        let version = pkg.version().ok_or(Error::InvalidArgument("version"))?;
        Ok(outdir.join(format!("{}-{}.{}", name, version, self.format.extension())))
    }

    /// Write `pkg` to `<outdir>/<name>-<version>.<ext>`.
    ///
    /// Payload files are read from `root`. When the package lists no files
    /// the whole staging tree is packed and hashed.
    pub fn write(&self, pkg: &Package, root: Option<&Path>, outdir: &Path) -> Result<PathBuf> {
        let out_path = self.output_path(pkg, outdir)?;

        let mut pkg = pkg.clone();
        if pkg.files().is_empty() {
            if let Some(root) = root {
                for path in walk_tree(root)? {
                    let sum = sha256_file(&root.join(path.trim_start_matches('/')))?;
                    pkg.add_file(&path, &sum)?;
                }
            }
        }

        fs::create_dir_all(outdir).map_err(|e| {
            Error::IoError(format!("Failed to create directory {}: {}", outdir.display(), e))
        })?;

        let file = File::create(&out_path)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {}", out_path.display(), e)))?;
        let mut builder = Builder::new(Compressor::new(self.format, file)?);

        self.append_control(&mut builder, &pkg)?;

        let mut packed = 0usize;
        for entry in pkg.files() {
            let rel = entry.path.trim_start_matches('/');
            let source = match root {
                Some(root) => root.join(rel),
                None => PathBuf::from(&entry.path),
            };
            match builder.append_path_with_name(&source, rel) {
                Ok(()) => packed += 1,
                Err(e) if self.developer_mode => {
                    return Err(Error::IoError(format!(
                        "Failed to pack {}: {}",
                        source.display(),
                        e
                    )));
                }
                Err(e) => warn!("Skipping {}: {}", source.display(), e),
            }
        }

        let compressor = builder
            .into_inner()
            .map_err(|e| Error::IoError(format!("Failed to finish archive: {}", e)))?;
        compressor
            .finish()
            .map_err(|e| Error::IoError(format!("Failed to finish archive: {}", e)))?;

        info!(
            "Created {} ({} files, {} scripts)",
            out_path.display(),
            packed,
            pkg.scripts().len()
        );
        Ok(out_path)
    }

    /// Re-pack the installed package registered under `origin`.
    ///
    /// Payload files are read below `root`, or from their installed paths
    /// when no root is given.
    pub fn write_installed(
        &self,
        conn: &Connection,
        origin: &str,
        root: Option<&Path>,
        outdir: &Path,
    ) -> Result<PathBuf> {
        let record = InstalledPackage::find_by_origin(conn, origin)?
            .ok_or_else(|| Error::NotInstalled(origin.to_string()))?;
        let pkg = record.to_package(conn)?;
        debug!("Re-packing installed {}-{}", record.name, record.version);
        self.write(&pkg, root, outdir)
    }

    fn append_control<W: Write>(&self, builder: &mut Builder<W>, pkg: &Package) -> Result<()> {
        // Scripts travel as their own control entries
        let mut doc = ManifestDoc::from_package(pkg);
        doc.scripts.clear();
        append_buffer(builder, MANIFEST_NAME, doc.to_json()?.as_bytes())?;

        for (attr, name) in [
            (Attr::Desc, DESC_NAME),
            (Attr::Message, DISPLAY_NAME),
            (Attr::Mtree, MTREE_NAME),
        ] {
            if let Some(value) = pkg.get(attr) {
                append_buffer(builder, name, value.as_bytes())?;
            }
        }

        for script in pkg.scripts() {
            append_buffer(builder, script.phase.control_name(), script.body.as_bytes())?;
        }
        Ok(())
    }
}

fn append_buffer<W: Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    debug!("Packing control entry {} ({} bytes)", name, data.len());
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| Error::IoError(format!("Failed to pack {}: {}", name, e)))
}
