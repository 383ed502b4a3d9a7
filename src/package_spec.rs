// src/package_spec.rs

//! Resolved package specifications
//!
//! A [`PackageSpec`] is a fully pinned package: what the solver picked,
//! where it came from and how to verify it. Callers own them by value.

use crate::hash::Checksum;
use crate::version::RpmVersion;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub epoch: u64,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub checksum: Checksum,
    /// Id of the repository the package was resolved from
    pub repo_id: String,
    /// Path of the package relative to the repository base
    pub location: String,
    /// Full download reference (repository base joined with `location`)
    pub remote_location: String,
    pub check_gpg: bool,
    pub ignore_ssl: bool,
}

impl PackageSpec {
    pub fn evr(&self) -> RpmVersion {
        RpmVersion::new(self.epoch, self.version.clone(), Some(self.release.clone()))
    }

    /// `name-[epoch:]version-release.arch`, epoch omitted when zero
    pub fn nevra(&self) -> String {
        format!("{}-{}.{}", self.name, self.evr(), self.arch)
    }

    /// Deterministic output order: name, then version, then architecture
    pub fn output_order(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.evr().cmp(&other.evr()))
            .then_with(|| self.arch.cmp(&other.arch))
            .then_with(|| self.repo_id.cmp(&other.repo_id))
    }

    /// Identity of the built package, independent of where it came from
    pub(crate) fn same_build(&self, other: &Self) -> bool {
        self.name == other.name
            && self.epoch == other.epoch
            && self.version == other.version
            && self.release == other.release
            && self.arch == other.arch
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nevra())
    }
}

/// Sort specs into output order and drop duplicate builds
pub fn normalize(mut specs: Vec<PackageSpec>) -> Vec<PackageSpec> {
    specs.sort_by(|a, b| a.output_order(b));
    specs.dedup_by(|b, a| a.same_build(b));
    specs
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::hash::ChecksumType;

    pub fn spec(name: &str, evr: &str, arch: &str, repo: &str) -> PackageSpec {
        let v = RpmVersion::parse(evr).unwrap();
        PackageSpec {
            name: name.to_string(),
            epoch: v.epoch,
            version: v.version,
            release: v.release.unwrap_or_else(|| "1".to_string()),
            arch: arch.to_string(),
            checksum: Checksum::new(ChecksumType::Sha256, "ab").unwrap(),
            repo_id: repo.to_string(),
            location: format!("Packages/{}.rpm", name),
            remote_location: format!("https://example.com/{}/Packages/{}.rpm", repo, name),
            check_gpg: true,
            ignore_ssl: false,
        }
    }
}
