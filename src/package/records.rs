// src/package/records.rs

//! Auxiliary record kinds held in a package's collections

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Point in the install/upgrade/deinstall lifecycle at which a script or
/// command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptPhase {
    PreInstall,
    PostInstall,
    Install,
    PreDeinstall,
    PostDeinstall,
    Deinstall,
    PreUpgrade,
    PostUpgrade,
    Upgrade,
}

impl ScriptPhase {
    pub const ALL: [ScriptPhase; 9] = [
        ScriptPhase::PreInstall,
        ScriptPhase::PostInstall,
        ScriptPhase::Install,
        ScriptPhase::PreDeinstall,
        ScriptPhase::PostDeinstall,
        ScriptPhase::Deinstall,
        ScriptPhase::PreUpgrade,
        ScriptPhase::PostUpgrade,
        ScriptPhase::Upgrade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptPhase::PreInstall => "pre-install",
            ScriptPhase::PostInstall => "post-install",
            ScriptPhase::Install => "install",
            ScriptPhase::PreDeinstall => "pre-deinstall",
            ScriptPhase::PostDeinstall => "post-deinstall",
            ScriptPhase::Deinstall => "deinstall",
            ScriptPhase::PreUpgrade => "pre-upgrade",
            ScriptPhase::PostUpgrade => "post-upgrade",
            ScriptPhase::Upgrade => "upgrade",
        }
    }

    /// Name of the archive control entry carrying this phase's script
    pub fn control_name(&self) -> &'static str {
        match self {
            ScriptPhase::PreInstall => "+PRE_INSTALL",
            ScriptPhase::PostInstall => "+POST_INSTALL",
            ScriptPhase::Install => "+INSTALL",
            ScriptPhase::PreDeinstall => "+PRE_DEINSTALL",
            ScriptPhase::PostDeinstall => "+POST_DEINSTALL",
            ScriptPhase::Deinstall => "+DEINSTALL",
            ScriptPhase::PreUpgrade => "+PRE_UPGRADE",
            ScriptPhase::PostUpgrade => "+POST_UPGRADE",
            ScriptPhase::Upgrade => "+UPGRADE",
        }
    }

    /// Ports-tree style script file name (`pkg-pre-install`, ...)
    pub fn file_name(&self) -> String {
        format!("pkg-{}", self.as_str())
    }

    /// Map an archive control entry name to its phase
    pub fn from_control_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.control_name() == name)
    }

    /// Map a script file's base name to its phase.
    ///
    /// Accepts both the `pkg-<phase>` form and the `+<PHASE>` control form.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if let Some(phase) = Self::from_control_name(name) {
            return Some(phase);
        }
        name.strip_prefix("pkg-")
            .and_then(|rest| rest.parse().ok())
    }
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptPhase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Invalid script phase: {}", s))
    }
}

/// A lifecycle script body tagged with its phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub phase: ScriptPhase,
    pub body: String,
}

/// A single command run at a lifecycle phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exec {
    pub cmd: String,
    pub phase: ScriptPhase,
}

/// A file shipped by the package with its SHA-256 content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub path: String,
    pub sha256: String,
}

/// Glob pattern naming packages this one cannot be installed alongside
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub glob: String,
}

/// Build option name/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgOption {
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_file_name() {
        assert_eq!(
            ScriptPhase::from_file_name("pkg-post-install"),
            Some(ScriptPhase::PostInstall)
        );
        assert_eq!(
            ScriptPhase::from_file_name("pkg-deinstall"),
            Some(ScriptPhase::Deinstall)
        );
        assert_eq!(
            ScriptPhase::from_file_name("+PRE_UPGRADE"),
            Some(ScriptPhase::PreUpgrade)
        );
        assert_eq!(ScriptPhase::from_file_name("pkg-banana"), None);
        assert_eq!(ScriptPhase::from_file_name("post-install"), None);
    }

    #[test]
    fn test_every_phase_has_both_names() {
        for phase in ScriptPhase::ALL {
            assert_eq!(ScriptPhase::from_control_name(phase.control_name()), Some(phase));
            assert_eq!(ScriptPhase::from_file_name(&phase.file_name()), Some(phase));
        }
    }

    #[test]
    fn test_phase_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ScriptPhase::PostDeinstall).unwrap();
        assert_eq!(json, "\"post-deinstall\"");
        let phase: ScriptPhase = serde_json::from_str("\"pre-upgrade\"").unwrap();
        assert_eq!(phase, ScriptPhase::PreUpgrade);
    }

    #[test]
    fn test_phase_from_str_rejects_unknown() {
        assert!("banana".parse::<ScriptPhase>().is_err());
        assert_eq!("install".parse::<ScriptPhase>(), Ok(ScriptPhase::Install));
    }
}
