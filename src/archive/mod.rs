// src/archive/mod.rs

//! Package archive ingestion
//!
//! A package archive is a tar stream, usually compressed, whose leading
//! entries are control files named with a `+` prefix (`+MANIFEST`,
//! `+DESC`, scripts, ...). Ingestion walks only that leading control
//! section and stops at the first payload entry; the payload belongs to
//! the install step.

pub mod create;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{self, Fetcher};
use crate::manifest::ManifestDecoder;
use crate::package::{Attr, Package, PackageKind, ScriptPhase};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tar::{Archive, Entry};
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

/// First character of every control entry name
pub const CONTROL_PREFIX: char = '+';

pub const MANIFEST_NAME: &str = "+MANIFEST";
pub const DESC_NAME: &str = "+DESC";
pub const MTREE_NAME: &str = "+MTREE_DIRS";
pub const DISPLAY_NAME: &str = "+DISPLAY";
pub const COMMENT_NAME: &str = "+COMMENT";
/// Packing list of the legacy archive layout
pub const CONTENTS_NAME: &str = "+CONTENTS";

/// Control entries are copied in chunks of this size
const CHUNK_SIZE: usize = 2048;

/// Largest `+MANIFEST` the reader accepts
pub const MAX_MANIFEST_SIZE: u64 = 16 * 1024 * 1024;

/// Stream compression wrapped around the tar data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    /// Identify the compression from the first bytes of the file
    pub fn detect(magic: &[u8]) -> Option<Self> {
        if magic.starts_with(&[0x1F, 0x8B]) {
            Some(Compression::Gzip)
        } else if magic.starts_with(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]) {
            Some(Compression::Xz)
        } else if magic.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
            Some(Compression::Zstd)
        } else if magic.len() >= 262 && &magic[257..262] == b"ustar" {
            Some(Compression::None)
        } else {
            None
        }
    }
}

/// What a control entry's name routes it to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEntry {
    Manifest,
    Blob(Attr),
    Script(ScriptPhase),
    /// Legacy packing list; only marks the archive as old-format
    Contents,
}

impl ControlEntry {
    /// Classify a control entry name. `None` for names this engine skips.
    pub fn classify(name: &str) -> Option<Self> {
        match name {
            MANIFEST_NAME => Some(ControlEntry::Manifest),
            DESC_NAME => Some(ControlEntry::Blob(Attr::Desc)),
            MTREE_NAME => Some(ControlEntry::Blob(Attr::Mtree)),
            DISPLAY_NAME => Some(ControlEntry::Blob(Attr::Message)),
            COMMENT_NAME => Some(ControlEntry::Blob(Attr::Comment)),
            CONTENTS_NAME => Some(ControlEntry::Contents),
            _ => ScriptPhase::from_control_name(name).map(ControlEntry::Script),
        }
    }
}

/// Open `path` as a tar archive, undoing whatever compression wraps it
pub fn open_archive(path: &Path) -> Result<Archive<Box<dyn Read>>> {
    let mut file = File::open(path)
        .map_err(|e| Error::Archive(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut magic = Vec::with_capacity(512);
    (&mut file)
        .take(512)
        .read_to_end(&mut magic)
        .map_err(|e| Error::Archive(format!("Failed to read {}: {}", path.display(), e)))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| Error::Archive(format!("Failed to rewind {}: {}", path.display(), e)))?;

    let compression = Compression::detect(&magic).ok_or_else(|| {
        Error::Archive(format!("Unrecognized archive format: {}", path.display()))
    })?;
    debug!("Detected {:?} compression for {}", compression, path.display());

    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::Xz => Box::new(XzDecoder::new(file)),
        Compression::Zstd => {
            let decoder = zstd::Decoder::new(file)
                .map_err(|e| Error::Archive(format!("Failed to create zstd decoder: {}", e)))?;
            Box::new(decoder)
        }
    };

    Ok(Archive::new(reader))
}

/// Read an entry to its end in bounded chunks
fn read_chunked<R: Read>(entry: &mut Entry<'_, R>, name: &str) -> Result<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = entry
            .read(&mut buf)
            .map_err(|e| Error::Archive(format!("Failed to read {}: {}", name, e)))?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(data).map_err(|_| Error::Archive(format!("{} is not valid UTF-8", name)))
}

/// Builds [`Package`] values from package archives
pub struct PackageReader<'a> {
    decoder: &'a dyn ManifestDecoder,
    fetcher: Option<&'a dyn Fetcher>,
    developer_mode: bool,
}

impl<'a> PackageReader<'a> {
    pub fn new(decoder: &'a dyn ManifestDecoder, config: &Config) -> Self {
        Self {
            decoder,
            fetcher: None,
            developer_mode: config.developer_mode,
        }
    }

    /// Allow remote URIs, materialized through `fetcher`
    pub fn with_fetcher(mut self, fetcher: &'a dyn Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Read the archive at `path` into a new package
    pub fn open(&self, path: &str) -> Result<Package> {
        let mut pkg = Package::new();
        self.read_into(path, &mut pkg)?;
        Ok(pkg)
    }

    /// Read the archive at `path` into `pkg`, resetting it first.
    ///
    /// On error the package must not be trusted; entries routed before
    /// the failure may already have been applied.
    pub fn read_into(&self, path: &str, pkg: &mut Package) -> Result<()> {
        let local = self.localize(path)?;

        let mut archive = open_archive(&local)?;

        pkg.reset();
        pkg.kind = PackageKind::File;
        pkg.set_source_path(&local);

        let mut saw_manifest = false;
        let mut saw_contents = false;

        let entries = archive
            .entries()
            .map_err(|e| Error::Archive(format!("Failed to read archive: {}", e)))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| Error::Archive(format!("Failed to read entry: {}", e)))?;

            let name = entry
                .path()
                .map_err(|e| Error::Archive(format!("Failed to get entry path: {}", e)))?
                .to_string_lossy()
                .into_owned();

            if !name.starts_with(CONTROL_PREFIX) {
                debug!("Control section ends at {}", name);
                break;
            }

            match ControlEntry::classify(&name) {
                Some(ControlEntry::Manifest) => {
                    let size = entry.header().size().map_err(|e| {
                        Error::Archive(format!("Failed to get size of {}: {}", name, e))
                    })?;
                    if size > MAX_MANIFEST_SIZE {
                        return Err(Error::Archive(format!(
                            "{} declares {} bytes, limit is {}",
                            name, size, MAX_MANIFEST_SIZE
                        )));
                    }
                    let text = read_chunked(&mut entry, &name)?;
                    self.decoder.decode(&text, pkg)?;
                    saw_manifest = true;
                }
                Some(ControlEntry::Blob(attr)) => {
                    let mut data = read_chunked(&mut entry, &name)?;
                    if attr == Attr::Comment {
                        data.truncate(data.trim_end_matches('\n').len());
                    }
                    pkg.set(attr, &data)?;
                }
                Some(ControlEntry::Script(phase)) => {
                    let body = read_chunked(&mut entry, &name)?;
                    pkg.add_script(body, phase);
                }
                Some(ControlEntry::Contents) => saw_contents = true,
                None if self.developer_mode => warn!("Skipping unknown control file {}", name),
                None => debug!("Skipping unknown control file {}", name),
            }
        }

        if !saw_manifest {
            if saw_contents {
                pkg.kind = PackageKind::OldFile;
            } else if self.developer_mode {
                warn!("{} has no {}", local.display(), MANIFEST_NAME);
            }
        }

        info!(
            "Read package {}-{} from {} ({} scripts)",
            pkg.name().unwrap_or("?"),
            pkg.version().unwrap_or("?"),
            local.display(),
            pkg.scripts().len()
        );
        Ok(())
    }

    fn localize(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            return Err(Error::InvalidArgument("path"));
        }
        if !fetch::is_remote(path) {
            return Ok(PathBuf::from(path));
        }
        let fetcher = self.fetcher.ok_or_else(|| {
            Error::DownloadError(format!("No fetcher configured for {}", path))
        })?;
        fetcher.fetch(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::JsonManifest;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use std::cell::RefCell;
    use tar::{Builder, Header};
    use tempfile::TempDir;

    fn append(builder: &mut Builder<impl std::io::Write>, name: &str, data: &[u8]) {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    }

    fn write_tgz(dir: &TempDir, file_name: &str, entries: &[(&str, &[u8])]) -> String {
        let path = dir.path().join(file_name);
        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, GzLevel::default()));
        for (name, data) in entries {
            append(&mut builder, name, data);
        }
        builder.into_inner().unwrap().finish().unwrap();
        path.to_str().unwrap().to_string()
    }

    fn reader(decoder: &JsonManifest) -> PackageReader<'_> {
        PackageReader::new(decoder, &Config::default())
    }

    #[test]
    fn test_compression_detection() {
        assert_eq!(Compression::detect(&[0x1F, 0x8B, 8, 0]), Some(Compression::Gzip));
        assert_eq!(
            Compression::detect(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0]),
            Some(Compression::Xz)
        );
        assert_eq!(
            Compression::detect(&[0x28, 0xB5, 0x2F, 0xFD, 0]),
            Some(Compression::Zstd)
        );
        let mut plain = vec![0u8; 512];
        plain[257..262].copy_from_slice(b"ustar");
        assert_eq!(Compression::detect(&plain), Some(Compression::None));
        assert_eq!(Compression::detect(b"PK\x03\x04"), None);
    }

    #[test]
    fn test_classify_control_names() {
        assert_eq!(ControlEntry::classify("+MANIFEST"), Some(ControlEntry::Manifest));
        assert_eq!(ControlEntry::classify("+DESC"), Some(ControlEntry::Blob(Attr::Desc)));
        assert_eq!(
            ControlEntry::classify("+MTREE_DIRS"),
            Some(ControlEntry::Blob(Attr::Mtree))
        );
        assert_eq!(
            ControlEntry::classify("+POST_DEINSTALL"),
            Some(ControlEntry::Script(ScriptPhase::PostDeinstall))
        );
        assert_eq!(ControlEntry::classify("+COMPACT_MANIFEST"), None);
    }

    #[test]
    fn test_stops_at_first_payload_entry() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(
            &dir,
            "pkg.tgz",
            &[
                ("+MANIFEST", br#"{"name": "foo", "version": "1.0", "origin": "misc/foo"}"#),
                ("+DESC", b"Foo does things"),
                ("+PRE_INSTALL", b"echo pre"),
                ("usr/bin/foo", b"\x7fELF"),
                ("+POST_INSTALL", b"echo never read"),
            ],
        );

        let decoder = JsonManifest;
        let pkg = reader(&decoder).open(&path).unwrap();

        assert_eq!(pkg.kind, PackageKind::File);
        assert_eq!(pkg.name(), Some("foo"));
        assert_eq!(pkg.get(Attr::Desc), Some("Foo does things"));
        assert_eq!(pkg.scripts().len(), 1);
        assert_eq!(pkg.scripts()[0].phase, ScriptPhase::PreInstall);
        assert_eq!(pkg.source_path(), Some(Path::new(&path)));
    }

    #[test]
    fn test_large_blob_is_read_across_chunks() {
        let dir = TempDir::new().unwrap();
        let desc = "x".repeat(CHUNK_SIZE * 3 + 17);
        let path = write_tgz(&dir, "big.tgz", &[("+DESC", desc.as_bytes())]);

        let decoder = JsonManifest;
        let pkg = reader(&decoder).open(&path).unwrap();
        assert_eq!(pkg.get(Attr::Desc).map(str::len), Some(desc.len()));
    }

    #[test]
    fn test_zero_length_control_files_are_empty_not_absent() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(&dir, "empty.tgz", &[("+DESC", b""), ("+INSTALL", b"")]);

        let decoder = JsonManifest;
        let pkg = reader(&decoder).open(&path).unwrap();
        assert_eq!(pkg.get(Attr::Desc), Some(""));
        assert_eq!(pkg.script(ScriptPhase::Install).unwrap().body, "");
    }

    #[test]
    fn test_mtree_blob_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(&dir, "mtree.tgz", &[("+MTREE_DIRS", b"/set type=dir uname=root\n")]);

        let decoder = JsonManifest;
        let pkg = reader(&decoder).open(&path).unwrap();
        assert_eq!(pkg.get(Attr::Mtree), Some("#mtree\n/set type=dir uname=root\n"));
    }

    #[test]
    fn test_unknown_control_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(
            &dir,
            "unknown.tgz",
            &[("+COMPACT_MANIFEST", b"{}"), ("+DESC", b"still read")],
        );

        let decoder = JsonManifest;
        let pkg = reader(&decoder).open(&path).unwrap();
        assert_eq!(pkg.get(Attr::Desc), Some("still read"));
    }

    #[test]
    fn test_missing_manifest_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(&dir, "nomanifest.tgz", &[("usr/bin/foo", b"bin")]);

        let decoder = JsonManifest;
        let pkg = reader(&decoder).open(&path).unwrap();
        assert_eq!(pkg.kind, PackageKind::File);
        assert_eq!(pkg.name(), None);
    }

    #[test]
    fn test_legacy_layout_is_old_file() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(
            &dir,
            "legacy.tgz",
            &[
                ("+CONTENTS", b"@name foo-1.0\n"),
                ("+COMMENT", b"Legacy foo\n"),
                ("+DISPLAY", b"Read the docs"),
            ],
        );

        let decoder = JsonManifest;
        let pkg = reader(&decoder).open(&path).unwrap();
        assert_eq!(pkg.kind, PackageKind::OldFile);
        assert_eq!(pkg.get(Attr::Comment), Some("Legacy foo"));
        assert_eq!(pkg.get(Attr::Message), Some("Read the docs"));
    }

    #[test]
    fn test_manifest_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(&dir, "bad.tgz", &[("+MANIFEST", b"not json at all")]);

        let decoder = JsonManifest;
        let result = reader(&decoder).open(&path);
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_missing_file_is_archive_error() {
        let decoder = JsonManifest;
        let result = reader(&decoder).open("/nonexistent/pkgcore/foo.tgz");
        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[test]
    fn test_garbage_file_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.pkg");
        std::fs::write(&path, b"this is not a package archive").unwrap();

        let decoder = JsonManifest;
        let result = reader(&decoder).open(path.to_str().unwrap());
        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[test]
    fn test_truncated_archive_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let good = write_tgz(&dir, "good.tgz", &[("+DESC", "d".repeat(8192).as_bytes())]);
        let bytes = std::fs::read(&good).unwrap();

        // Decompress, cut the tar stream in the middle of the entry data
        let mut tar_bytes = Vec::new();
        GzDecoder::new(&bytes[..]).read_to_end(&mut tar_bytes).unwrap();
        let truncated = dir.path().join("truncated.tar");
        std::fs::write(&truncated, &tar_bytes[..1024]).unwrap();

        let decoder = JsonManifest;
        let result = reader(&decoder).open(truncated.to_str().unwrap());
        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[test]
    fn test_oversized_manifest_is_rejected_before_reading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.tar");

        // A lone header claiming an enormous manifest, with no data behind it
        let mut header = Header::new_gnu();
        header.set_path("+MANIFEST").unwrap();
        header.set_size(1 << 62);
        header.set_mode(0o644);
        header.set_cksum();
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 1024]);
        std::fs::write(&path, &bytes).unwrap();

        let decoder = JsonManifest;
        match reader(&decoder).open(path.to_str().unwrap()) {
            Err(Error::Archive(msg)) => assert!(msg.contains("+MANIFEST"), "{}", msg),
            other => panic!("expected archive error, got {:?}", other.map(|p| p.kind)),
        }
    }

    #[test]
    fn test_manifest_at_size_limit_boundary() {
        assert!(MAX_MANIFEST_SIZE >= 1024 * 1024);
        let dir = TempDir::new().unwrap();
        let manifest = format!(
            r#"{{"name": "big", "version": "1", "comment": "{}"}}"#,
            "x".repeat(CHUNK_SIZE * 3)
        );
        let path = write_tgz(&dir, "big.tgz", &[("+MANIFEST", manifest.as_bytes())]);

        let decoder = JsonManifest;
        let pkg = reader(&decoder).open(&path).unwrap();
        assert_eq!(pkg.name(), Some("big"));
        assert_eq!(pkg.get(Attr::Comment).map(str::len), Some(CHUNK_SIZE * 3));
    }

    #[test]
    fn test_invalid_utf8_control_file_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(&dir, "latin1.tgz", &[("+DESC", b"caf\xe9 \xff")]);

        let decoder = JsonManifest;
        match reader(&decoder).open(&path) {
            Err(Error::Archive(msg)) => assert!(msg.contains("UTF-8"), "{}", msg),
            other => panic!("expected archive error, got {:?}", other.map(|p| p.kind)),
        }
    }

    #[test]
    fn test_invalid_utf8_manifest_is_archive_error() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(&dir, "bad.tgz", &[("+MANIFEST", b"{\"name\": \"caf\xe9\"}")]);

        let decoder = JsonManifest;
        let result = reader(&decoder).open(&path);
        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[test]
    fn test_read_into_recycles_package() {
        let dir = TempDir::new().unwrap();
        let first = write_tgz(&dir, "a.tgz", &[("+DESC", b"first"), ("+INSTALL", b"a")]);
        let second = write_tgz(&dir, "b.tgz", &[("+PRE_UPGRADE", b"b")]);

        let decoder = JsonManifest;
        let reader = reader(&decoder);
        let mut pkg = Package::new();
        reader.read_into(&first, &mut pkg).unwrap();
        reader.read_into(&second, &mut pkg).unwrap();

        assert_eq!(pkg.get(Attr::Desc), None);
        assert_eq!(pkg.scripts().len(), 1);
        assert_eq!(pkg.scripts()[0].phase, ScriptPhase::PreUpgrade);
    }

    struct StubFetcher {
        local: PathBuf,
        calls: RefCell<Vec<String>>,
    }

    impl Fetcher for StubFetcher {
        fn fetch(&self, uri: &str) -> Result<PathBuf> {
            self.calls.borrow_mut().push(uri.to_string());
            Ok(self.local.clone())
        }
    }

    #[test]
    fn test_remote_path_goes_through_fetcher() {
        let dir = TempDir::new().unwrap();
        let local = write_tgz(&dir, "remote.tgz", &[("+DESC", b"fetched")]);
        let fetcher = StubFetcher {
            local: PathBuf::from(&local),
            calls: RefCell::new(Vec::new()),
        };

        let decoder = JsonManifest;
        let pkg = reader(&decoder)
            .with_fetcher(&fetcher)
            .open("https://pkg.example.org/All/remote.tgz")
            .unwrap();

        assert_eq!(pkg.get(Attr::Desc), Some("fetched"));
        assert_eq!(pkg.source_path(), Some(Path::new(&local)));
        let calls = fetcher.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], "https://pkg.example.org/All/remote.tgz");
    }

    #[test]
    fn test_remote_path_without_fetcher_fails() {
        let decoder = JsonManifest;
        let result = reader(&decoder).open("https://pkg.example.org/All/remote.tgz");
        assert!(matches!(result, Err(Error::DownloadError(_))));
    }
}
