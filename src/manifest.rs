// src/manifest.rs

//! Manifest decoding and encoding
//!
//! Ingestion only depends on the [`ManifestDecoder`] trait. [`JsonManifest`]
//! is the bundled implementation: a JSON document whose keys mirror the
//! package attributes and collections.

use crate::error::{Error, Result};
use crate::package::{Attr, Package, ScriptPhase};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Turns raw manifest text into package attributes and collections
pub trait ManifestDecoder {
    /// Decode `text` into `pkg`.
    ///
    /// On error the package must be left as it was before the call.
    fn decode(&self, text: &str, pkg: &mut Package) -> Result<()>;
}

/// Dependency entry in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepEntry {
    pub name: String,
    pub origin: String,
    pub version: String,
}

/// File entry in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub sha256: String,
}

/// Exec entry in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecEntry {
    pub cmd: String,
    pub phase: ScriptPhase,
}

/// On-disk manifest layout
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ManifestDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub www: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatsize: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<DepEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec: Vec<ExecEntry>,
}

impl ManifestDoc {
    fn attr_slot(&mut self, attr: Attr) -> &mut Option<String> {
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

    /// Snapshot a package into manifest form
    pub fn from_package(pkg: &Package) -> Self {
        let mut doc = ManifestDoc::default();
        for attr in Attr::ALL {
            *doc.attr_slot(attr) = pkg.get(attr).map(str::to_string);
        }
        doc.flatsize = pkg.flatsize();
        doc.deps = pkg
            .deps()
            .iter()
            .map(|d| DepEntry {
                name: d.name().unwrap_or_default().to_string(),
                origin: d.origin().unwrap_or_default().to_string(),
                version: d.version().unwrap_or_default().to_string(),
            })
            .collect();
        doc.files = pkg
            .files()
            .iter()
            .map(|f| FileEntry {
                path: f.path.clone(),
                sha256: f.sha256.clone(),
            })
            .collect();
        doc.conflicts = pkg.conflicts().iter().map(|c| c.glob.clone()).collect();
        doc.options = pkg
            .options()
            .iter()
            .map(|o| (o.name.clone(), o.value.clone()))
            .collect();
        doc.scripts = pkg
            .scripts()
            .iter()
            .map(|s| (s.phase.as_str().to_string(), s.body.clone()))
            .collect();
        doc.exec = pkg
            .execs()
            .iter()
            .map(|e| ExecEntry {
                cmd: e.cmd.clone(),
                phase: e.phase,
            })
            .collect();
        doc
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Manifest(format!("Failed to encode manifest: {}", e)))
    }

    /// Write every populated field into `pkg` through its validating mutators
    pub fn apply(mut self, pkg: &mut Package) -> Result<()> {
        for attr in Attr::ALL {
            if let Some(value) = self.attr_slot(attr).take() {
                pkg.set(attr, &value).map_err(invalid)?;
            }
        }
        if let Some(size) = self.flatsize {
            pkg.set_flatsize(size).map_err(invalid)?;
        }
        let mut seen = HashSet::new();
        for dep in &self.deps {
            if !seen.insert(dep.origin.as_str()) {
                return Err(Error::Manifest(format!("duplicate dependency origin: {}", dep.origin)));
            }
            pkg.add_dependency(&dep.name, &dep.origin, &dep.version)
                .map_err(invalid)?;
        }
        for file in &self.files {
            pkg.add_file(&file.path, &file.sha256).map_err(invalid)?;
        }
        for glob in &self.conflicts {
            pkg.add_conflict(glob).map_err(invalid)?;
        }
        for (name, value) in &self.options {
            pkg.add_option(name, value).map_err(invalid)?;
        }
        for (phase, body) in self.scripts {
            let phase: ScriptPhase = phase.parse().map_err(Error::Manifest)?;
            pkg.add_script(body, phase);
        }
        for exec in &self.exec {
            pkg.add_exec(&exec.cmd, exec.phase).map_err(invalid)?;
        }
        Ok(())
    }
}

fn invalid(e: Error) -> Error {
    Error::Manifest(format!("rejected value: {}", e))
}

/// JSON manifest format
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonManifest;

impl JsonManifest {
    /// Serialize a package's metadata as manifest text
    pub fn emit(pkg: &Package) -> Result<String> {
        ManifestDoc::from_package(pkg).to_json()
    }

    /// Read a manifest file from disk into `pkg`
    pub fn load_file(&self, path: impl AsRef<Path>, pkg: &mut Package) -> Result<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        self.decode(&text, pkg)
    }
}

impl ManifestDecoder for JsonManifest {
    fn decode(&self, text: &str, pkg: &mut Package) -> Result<()> {
        let doc: ManifestDoc = serde_json::from_str(text)
            .map_err(|e| Error::Manifest(format!("Failed to parse manifest: {}", e)))?;

        // Apply to a copy so a rejected value leaves `pkg` untouched
        let mut staged = pkg.clone();
        doc.apply(&mut staged)?;
        *pkg = staged;

        debug!(
            "Decoded manifest for {} ({} deps, {} files)",
            pkg.name().unwrap_or("<unnamed>"),
            pkg.deps().len(),
            pkg.files().len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_decode_populates_package() {
        let text = format!(
            r#"{{
                "name": "curl",
                "version": "8.4.0",
                "origin": "ftp/curl",
                "comment": "Command line tool for transferring data",
                "arch": "freebsd:14:x86:64",
                "www": "https://curl.se",
                "prefix": "/usr/local",
                "flatsize": 4520,
                "deps": [
                    {{"name": "ca_root_nss", "origin": "security/ca_root_nss", "version": "3.93"}},
                    {{"name": "libnghttp2", "origin": "www/libnghttp2", "version": "1.57.0"}}
                ],
                "files": [{{"path": "/usr/local/bin/curl", "sha256": "{HASH}"}}],
                "conflicts": ["ftp/curl-devel*"],
                "options": {{"HTTP2": "on"}},
                "scripts": {{"post-install": "echo done"}},
                "exec": [{{"cmd": "ldconfig", "phase": "post-install"}}]
            }}"#
        );

        let mut pkg = Package::new();
        JsonManifest.decode(&text, &mut pkg).unwrap();

        assert_eq!(pkg.name(), Some("curl"));
        assert_eq!(pkg.origin(), Some("ftp/curl"));
        assert_eq!(pkg.get(Attr::Prefix), Some("/usr/local"));
        assert_eq!(pkg.flatsize(), Some(4520));
        assert_eq!(pkg.deps().len(), 2);
        assert_eq!(pkg.deps()[1].origin(), Some("www/libnghttp2"));
        assert_eq!(pkg.files()[0].sha256, HASH);
        assert_eq!(pkg.conflicts()[0].glob, "ftp/curl-devel*");
        assert_eq!(pkg.options()[0].name, "HTTP2");
        assert_eq!(pkg.script(ScriptPhase::PostInstall).unwrap().body, "echo done");
        assert_eq!(pkg.execs()[0].phase, ScriptPhase::PostInstall);
    }

    #[test]
    fn test_decode_ignores_unknown_keys() {
        let mut pkg = Package::new();
        JsonManifest
            .decode(r#"{"name": "x", "shlibs_required": ["libc.so.7"]}"#, &mut pkg)
            .unwrap();
        assert_eq!(pkg.name(), Some("x"));
    }

    #[test]
    fn test_decode_malformed_text() {
        let mut pkg = Package::new();
        let result = JsonManifest.decode("name: curl", &mut pkg);
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_rejected_value_leaves_package_untouched() {
        let mut pkg = Package::new();
        pkg.set(Attr::Desc, "from +DESC").unwrap();

        let text = r#"{"name": "bad", "files": [{"path": "/a", "sha256": "short"}]}"#;
        let result = JsonManifest.decode(text, &mut pkg);

        assert!(matches!(result, Err(Error::Manifest(_))));
        assert_eq!(pkg.name(), None);
        assert_eq!(pkg.get(Attr::Desc), Some("from +DESC"));
        assert!(pkg.files().is_empty());
    }

    #[test]
    fn test_duplicate_dependency_origin_is_rejected() {
        let mut pkg = Package::new();
        let text = r#"{"name": "git", "deps": [
            {"name": "curl", "origin": "ftp/curl", "version": "8.5.0"},
            {"name": "curl", "origin": "ftp/curl", "version": "8.4.0"}
        ]}"#;
        let result = JsonManifest.decode(text, &mut pkg);

        match result {
            Err(Error::Manifest(msg)) => assert!(msg.contains("ftp/curl"), "{}", msg),
            other => panic!("expected manifest error, got {:?}", other),
        }
        assert!(pkg.deps().is_empty());
    }

    #[test]
    fn test_unknown_script_phase_is_rejected() {
        let mut pkg = Package::new();
        let result = JsonManifest.decode(r#"{"scripts": {"mid-install": "x"}}"#, &mut pkg);
        assert!(matches!(result, Err(Error::Manifest(_))));
    }

    #[test]
    fn test_emit_then_decode_preserves_metadata() {
        let mut pkg = Package::new();
        pkg.set(Attr::Name, "zsh").unwrap();
        pkg.set(Attr::Version, "5.9").unwrap();
        pkg.set(Attr::Origin, "shells/zsh").unwrap();
        pkg.add_dependency("pcre2", "devel/pcre2", "10.42").unwrap();
        pkg.add_script("echo bye", ScriptPhase::PreDeinstall);

        let text = JsonManifest::emit(&pkg).unwrap();
        let mut decoded = Package::new();
        JsonManifest.decode(&text, &mut decoded).unwrap();

        assert_eq!(decoded.attributes(), pkg.attributes());
        assert_eq!(decoded.deps(), pkg.deps());
        assert_eq!(decoded.scripts(), pkg.scripts());
    }
}
