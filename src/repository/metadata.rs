// src/repository/metadata.rs

//! Repository metadata data structures
//!
//! The normalized form every metadata format is parsed into. This is also
//! what the metadata cache stores on disk.

use crate::error::{Error, Result};
use crate::hash::Checksum;
use crate::version::{RpmVersion, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A capability: a provide, requirement, conflict or recommendation
///
/// String form matches the requirement syntax: `libc.so.6()(64bit)`,
/// `bind-libs = 32:9.16.23-1.el9`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl Capability {
    pub fn new(name: impl Into<String>, constraint: VersionConstraint) -> Self {
        Self {
            name: name.into(),
            constraint,
        }
    }

    pub fn unversioned(name: impl Into<String>) -> Self {
        Self::new(name, VersionConstraint::Any)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, rest) = match s.find(char::is_whitespace) {
            Some(pos) => (&s[..pos], s[pos..].trim()),
            None => (s, ""),
        };
        if name.is_empty() {
            return Err(Error::Parse("empty capability".to_string()));
        }
        Ok(Self::new(name, VersionConstraint::parse(rest)?))
    }

    /// Check whether `provide` satisfies this requirement
    pub fn is_satisfied_by(&self, provide: &Capability) -> bool {
        self.name == provide.name && self.constraint.overlaps(&provide.constraint)
    }

    /// `rpmlib(...)` requirements are satisfied by rpm itself
    pub fn is_rpmlib(&self) -> bool {
        self.name.starts_with("rpmlib(")
    }

    /// Absolute path requirements are satisfied by file lists
    pub fn is_file(&self) -> bool {
        self.name.starts_with('/')
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.constraint != VersionConstraint::Any {
            write!(f, " {}", self.constraint)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Capability {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.to_string()
    }
}

/// Module stream membership of a modular package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleTag {
    pub name: String,
    pub stream: String,
    /// Platform streams the module is built for (`el9`); empty means any
    #[serde(default)]
    pub platforms: Vec<String>,
    /// The stream is the distribution default for its module
    #[serde(default)]
    pub default: bool,
}

/// Package metadata in a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default)]
    pub epoch: u64,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub checksum: Checksum,
    /// Path relative to the repository base
    pub location: String,
    #[serde(default)]
    pub provides: Vec<Capability>,
    #[serde(default)]
    pub requires: Vec<Capability>,
    /// Weak dependencies, only pulled in when a set asks for them
    #[serde(default)]
    pub recommends: Vec<Capability>,
    #[serde(default)]
    pub conflicts: Vec<Capability>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub module: Option<ModuleTag>,
}

impl PackageMetadata {
    pub fn evr(&self) -> RpmVersion {
        RpmVersion::new(self.epoch, self.version.clone(), Some(self.release.clone()))
    }

    /// `name-epoch:version-release.arch`, the form module artifacts use
    pub fn nevra(&self) -> String {
        format!(
            "{}-{}:{}-{}.{}",
            self.name, self.epoch, self.version, self.release, self.arch
        )
    }

    /// The implicit `name = evr` provide every package carries
    pub fn self_provide(&self) -> Capability {
        Capability::new(self.name.clone(), VersionConstraint::Exact(self.evr()))
    }

    /// Check whether this package provides a capability
    pub fn provides_capability(&self, cap: &Capability) -> bool {
        if cap.is_file() {
            return self.files.iter().any(|f| f == &cap.name);
        }
        cap.is_satisfied_by(&self.self_provide())
            || self.provides.iter().any(|p| cap.is_satisfied_by(p))
    }
}

/// All packages parsed from one repository
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryData {
    pub repo_id: String,
    pub packages: Vec<PackageMetadata>,
}

impl RepositoryData {
    pub fn new(repo_id: impl Into<String>, packages: Vec<PackageMetadata>) -> Self {
        Self {
            repo_id: repo_id.into(),
            packages,
        }
    }
}

/// Shape of the `metadata.json` index format
#[derive(Debug, Deserialize)]
pub(crate) struct JsonIndex {
    #[serde(default)]
    #[allow(dead_code)]
    pub name: Option<String>,
    pub packages: Vec<PackageMetadata>,
}
