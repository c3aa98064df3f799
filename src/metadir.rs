// src/metadir.rs

//! Loading a package from a staged metadata directory
//!
//! A metadata directory holds a `+MANIFEST` plus optional `+DESC`,
//! `+DISPLAY`, `+MTREE_DIRS` and script files. It is the input for
//! registering a package without an archive and for creating archives.

use crate::archive::{DESC_NAME, DISPLAY_NAME, MANIFEST_NAME, MTREE_NAME};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::manifest::JsonManifest;
use crate::package::{Attr, Package, PackageKind, ScriptPhase};
use regex::RegexBuilder;
use std::path::Path;
use tracing::{debug, info, warn};

/// Value stored as `www` when the description carries no `WWW:` line
pub const UNKNOWN_WWW: &str = "UNKNOWN";

/// ABI string of the running host, `<os>:<arch>`
pub fn host_abi() -> String {
    format!("{}:{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Build a package from the metadata directory `dir`.
///
/// The manifest is required. Description, message and mtree fall back to
/// their files when the manifest leaves them unset, every script file
/// present is attached, arch defaults to [`host_abi`] and www is taken
/// from the description when not declared.
pub fn load_metadata_dir(dir: &Path, decoder: &JsonManifest, config: &Config) -> Result<Package> {
    debug!("Loading metadata directory {}", dir.display());

    let mut pkg = Package::with_kind(PackageKind::File);
    decoder.load_file(dir.join(MANIFEST_NAME), &mut pkg)?;

    for (attr, file) in [
        (Attr::Desc, DESC_NAME),
        (Attr::Message, DISPLAY_NAME),
        (Attr::Mtree, MTREE_NAME),
    ] {
        let path = dir.join(file);
        if pkg.get(attr).is_none() && path.exists() {
            pkg.set_from_file(attr, &path)?;
        }
    }

    apply_default_arch(&mut pkg, config)?;

    for phase in ScriptPhase::ALL {
        for name in [phase.control_name().to_string(), phase.file_name()] {
            let path = dir.join(&name);
            if path.exists() {
                pkg.add_script_from_file(&path)?;
            }
        }
    }

    if pkg.get(Attr::Www).is_none() {
        let desc = pkg
            .get(Attr::Desc)
            .ok_or_else(|| Error::Manifest("No www or desc defined in manifest".to_string()))?;
        let www = www_from_description(desc)?;
        pkg.set(Attr::Www, www.as_deref().unwrap_or(UNKNOWN_WWW))?;
    }

    info!(
        "Loaded {}-{} from {}",
        pkg.name().unwrap_or("<unnamed>"),
        pkg.version().unwrap_or("?"),
        dir.display()
    );
    Ok(pkg)
}

/// Build a package from a bare manifest file, with arch defaulted to
/// [`host_abi`]
pub fn load_manifest_file(path: &Path, decoder: &JsonManifest, config: &Config) -> Result<Package> {
    let mut pkg = Package::with_kind(PackageKind::File);
    decoder.load_file(path, &mut pkg)?;
    apply_default_arch(&mut pkg, config)?;
    Ok(pkg)
}

fn apply_default_arch(pkg: &mut Package, config: &Config) -> Result<()> {
    let host = host_abi();
    match pkg.get(Attr::Arch).map(str::to_string) {
        None => pkg.set(Attr::Arch, &host)?,
        Some(declared) if config.developer_mode && declared != host => {
            warn!("Declared arch {} differs from host {}", declared, host);
        }
        Some(_) => {}
    }
    Ok(())
}

/// The URL of the first `WWW:` line in a description, if any
pub fn www_from_description(desc: &str) -> Result<Option<String>> {
    let re = RegexBuilder::new(r"^WWW:[[:space:]]*(.*)$")
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|e| Error::Manifest(format!("Invalid www pattern: {}", e)))?;

    Ok(re
        .captures(desc)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"{"name": "curl", "version": "8.5.0", "origin": "ftp/curl"}"#;

    fn metadir(manifest: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_NAME), manifest).unwrap();
        dir
    }

    #[test]
    fn test_www_from_description() {
        let desc = "A tool for transferring data.\n\nwww:   https://curl.se/\n";
        assert_eq!(
            www_from_description(desc).unwrap().as_deref(),
            Some("https://curl.se/")
        );
        assert_eq!(www_from_description("No link here").unwrap(), None);
    }

    #[test]
    fn test_files_fill_missing_fields() {
        let dir = metadir(MANIFEST);
        fs::write(dir.path().join(DESC_NAME), "Curl.\n\nWWW: https://curl.se\n").unwrap();
        fs::write(dir.path().join(DISPLAY_NAME), "Read the docs").unwrap();
        fs::write(dir.path().join(MTREE_NAME), "/set type=dir").unwrap();

        let pkg = load_metadata_dir(dir.path(), &JsonManifest, &Config::default()).unwrap();

        assert_eq!(pkg.kind, PackageKind::File);
        assert_eq!(pkg.get(Attr::Desc), Some("Curl.\n\nWWW: https://curl.se\n"));
        assert_eq!(pkg.get(Attr::Message), Some("Read the docs"));
        assert_eq!(pkg.get(Attr::Mtree), Some("#mtree\n/set type=dir"));
        assert_eq!(pkg.get(Attr::Www), Some("https://curl.se"));
        assert_eq!(pkg.get(Attr::Arch), Some(host_abi().as_str()));
    }

    #[test]
    fn test_manifest_values_win_over_files() {
        let dir = metadir(
            r#"{"name": "curl", "version": "8.5.0", "desc": "From manifest",
                "www": "https://example.org", "arch": "freebsd:14:x86:64"}"#,
        );
        fs::write(dir.path().join(DESC_NAME), "From file").unwrap();

        let config = Config::default().with_developer_mode(true);
        let pkg = load_metadata_dir(dir.path(), &JsonManifest, &config).unwrap();
        assert_eq!(pkg.get(Attr::Desc), Some("From manifest"));
        assert_eq!(pkg.get(Attr::Www), Some("https://example.org"));
        assert_eq!(pkg.get(Attr::Arch), Some("freebsd:14:x86:64"));
    }

    #[test]
    fn test_www_falls_back_to_unknown() {
        let dir = metadir(MANIFEST);
        fs::write(dir.path().join(DESC_NAME), "No homepage").unwrap();

        let pkg = load_metadata_dir(dir.path(), &JsonManifest, &Config::default()).unwrap();
        assert_eq!(pkg.get(Attr::Www), Some(UNKNOWN_WWW));
    }

    #[test]
    fn test_missing_www_and_desc_is_an_error() {
        let dir = metadir(MANIFEST);
        let result = load_metadata_dir(dir.path(), &JsonManifest, &Config::default());
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_script_files_are_attached() {
        let dir = metadir(r#"{"name": "curl", "version": "8.5.0", "www": "https://curl.se"}"#);
        fs::write(dir.path().join("+PRE_INSTALL"), "echo pre").unwrap();
        fs::write(dir.path().join("pkg-post-deinstall"), "echo post").unwrap();

        let pkg = load_metadata_dir(dir.path(), &JsonManifest, &Config::default()).unwrap();
        assert_eq!(pkg.scripts().len(), 2);
        assert_eq!(pkg.script(ScriptPhase::PreInstall).unwrap().body, "echo pre");
        assert_eq!(pkg.script(ScriptPhase::PostDeinstall).unwrap().body, "echo post");
    }

    #[test]
    fn test_bare_manifest_gets_host_arch() {
        let dir = metadir(MANIFEST);
        let path = dir.path().join(MANIFEST_NAME);

        let pkg = load_manifest_file(&path, &JsonManifest, &Config::default()).unwrap();
        assert_eq!(pkg.kind, PackageKind::File);
        assert_eq!(pkg.origin(), Some("ftp/curl"));
        assert_eq!(pkg.get(Attr::Arch), Some(host_abi().as_str()));
        assert_eq!(pkg.get(Attr::Www), None);
    }

    #[test]
    fn test_bare_manifest_keeps_declared_arch() {
        let dir = metadir(r#"{"name": "curl", "version": "8.5.0", "arch": "netbsd:10:aarch64"}"#);
        let path = dir.path().join(MANIFEST_NAME);

        let config = Config::default().with_developer_mode(true);
        let pkg = load_manifest_file(&path, &JsonManifest, &config).unwrap();
        assert_eq!(pkg.get(Attr::Arch), Some("netbsd:10:aarch64"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let result = load_metadata_dir(dir.path(), &JsonManifest, &Config::default());
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
