// src/packageset.rs

//! Package set inputs: requirements, package sets and chains
//!
//! These are produced by the manifest layer and only borrowed by the
//! solver for the duration of a resolve call.

use crate::error::{Error, Result};
use crate::repository::RepoConfig;
use crate::version::VersionConstraint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A package name or glob, optionally constrained by version
///
/// String form: `name`, `name-*`, `name >= 1.2-3`, and a leading `-`
/// marks an exclude (`-dracut-config-rescue`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Requirement {
    pub name: String,
    pub constraint: VersionConstraint,
    pub exclude: bool,
    glob: Option<glob::Pattern>,
}

impl Requirement {
    /// Parse a requirement string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (exclude, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, s),
        };

        let (name, rest) = match s.find(char::is_whitespace) {
            Some(pos) => (&s[..pos], s[pos..].trim()),
            None => (s, ""),
        };

        if name.is_empty() {
            return Err(Error::Config(format!("empty package requirement '{}'", s)));
        }

        let constraint = VersionConstraint::parse(rest)?;
        let glob = if is_glob(name) {
            Some(glob::Pattern::new(name).map_err(|e| {
                Error::Config(format!("invalid package pattern '{}': {}", name, e))
            })?)
        } else {
            None
        };

        Ok(Self {
            name: name.to_string(),
            constraint,
            exclude,
            glob,
        })
    }

    pub fn is_glob(&self) -> bool {
        self.glob.is_some()
    }

    /// Check whether a package name matches this requirement's name or glob
    pub fn matches_name(&self, name: &str) -> bool {
        match &self.glob {
            Some(pattern) => pattern.matches(name),
            None => self.name == name,
        }
    }
}

fn is_glob(name: &str) -> bool {
    name.contains(['*', '?', '['])
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exclude {
            write!(f, "-")?;
        }
        write!(f, "{}", self.name)?;
        if self.constraint != VersionConstraint::Any {
            write!(f, " {}", self.constraint)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Requirement {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Requirement> for String {
    fn from(value: Requirement) -> Self {
        value.to_string()
    }
}

/// How a package set uses the result of an earlier set in its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorMode {
    /// Prior packages are a floor: pinned and returned with this set
    Include,
    /// Prior packages are already installed: they satisfy dependencies
    /// but are not returned again
    Installed,
}

/// Reference to an earlier set in the same chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorSelection {
    pub set: String,
    pub mode: PriorMode,
}

/// One named unit of depsolve input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSet {
    pub name: String,
    /// Repositories to search; empty means the solver's defaults
    #[serde(default)]
    pub repositories: Vec<RepoConfig>,
    #[serde(default)]
    pub include: Vec<Requirement>,
    #[serde(default)]
    pub exclude: Vec<Requirement>,
    /// Module streams to enable, as `name:stream`
    #[serde(default)]
    pub enabled_modules: Vec<String>,
    #[serde(default)]
    pub install_weak_deps: bool,
    #[serde(default)]
    pub base: Option<PriorSelection>,
}

impl PackageSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repositories: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            enabled_modules: Vec::new(),
            install_weak_deps: false,
            base: None,
        }
    }

    /// Builder: add include requirements (a leading `-` turns one into an exclude)
    pub fn with_packages<I, S>(mut self, packages: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for p in packages {
            let req = Requirement::parse(p.as_ref())?;
            if req.exclude {
                self.exclude.push(req);
            } else {
                self.include.push(req);
            }
        }
        Ok(self)
    }

    pub fn with_excludes<I, S>(mut self, packages: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for p in packages {
            let mut req = Requirement::parse(p.as_ref())?;
            req.exclude = true;
            self.exclude.push(req);
        }
        Ok(self)
    }

    pub fn with_repositories(mut self, repositories: Vec<RepoConfig>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn with_base(mut self, set: impl Into<String>, mode: PriorMode) -> Self {
        self.base = Some(PriorSelection {
            set: set.into(),
            mode,
        });
        self
    }

    pub fn with_weak_deps(mut self, enabled: bool) -> Self {
        self.install_weak_deps = enabled;
        self
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Requirements to install; `-name` entries of `include` are left out
    pub(crate) fn includes(&self) -> impl Iterator<Item = &Requirement> {
        self.include.iter().filter(|r| !r.exclude)
    }

    /// Requirements to remove from the result
    pub(crate) fn excludes(&self) -> impl Iterator<Item = &Requirement> {
        self.exclude
            .iter()
            .chain(self.include.iter().filter(|r| r.exclude))
    }

    /// Parsed `name:stream` pairs
    pub(crate) fn module_streams(&self) -> Result<Vec<(String, String)>> {
        self.enabled_modules
            .iter()
            .map(|m| {
                m.split_once(':')
                    .filter(|(n, s)| !n.is_empty() && !s.is_empty())
                    .map(|(n, s)| (n.to_string(), s.to_string()))
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "module '{}' in package set '{}' is not name:stream",
                            m, self.name
                        ))
                    })
            })
            .collect()
    }
}

/// An ordered sequence of package sets resolved one after another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSetChain {
    pub name: String,
    pub sets: Vec<PackageSet>,
}

impl PackageSetChain {
    pub fn new(name: impl Into<String>, sets: Vec<PackageSet>) -> Self {
        Self {
            name: name.into(),
            sets,
        }
    }

    /// Check the structural invariants of a chain
    ///
    /// Set names are unique and a set may only reference a set declared
    /// before it, which rules out cycles.
    pub fn validate(&self) -> Result<()> {
        if self.sets.is_empty() {
            return Err(Error::Config(format!("chain '{}' has no package sets", self.name)));
        }

        let mut seen = HashSet::new();
        for set in &self.sets {
            if let Some(base) = &set.base
                && !seen.contains(base.set.as_str())
            {
                return Err(Error::Config(format!(
                    "package set '{}' in chain '{}' references '{}', which is not an earlier set",
                    set.name, self.name, base.set
                )));
            }
            if !seen.insert(set.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate package set name '{}' in chain '{}'",
                    set.name, self.name
                )));
            }
        }
        Ok(())
    }

    pub fn set_names(&self) -> Vec<&str> {
        self.sets.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::RpmVersion;

    #[test]
    fn test_parse_plain_and_versioned() {
        let r = Requirement::parse("bind").unwrap();
        assert_eq!(r.name, "bind");
        assert_eq!(r.constraint, VersionConstraint::Any);
        assert!(!r.exclude && !r.is_glob());

        let r = Requirement::parse("bind >= 32:9.16").unwrap();
        assert_eq!(
            r.constraint,
            VersionConstraint::GreaterOrEqual(RpmVersion::parse("32:9.16").unwrap())
        );
        assert_eq!(r.to_string(), "bind >= 32:9.16");
    }

    #[test]
    fn test_parse_exclude_and_glob() {
        let r = Requirement::parse("-kernel-debug*").unwrap();
        assert!(r.exclude);
        assert!(r.is_glob());
        assert!(r.matches_name("kernel-debug-core"));
        assert!(!r.matches_name("kernel-core"));
        assert_eq!(r.to_string(), "-kernel-debug*");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Requirement::parse("").is_err());
        assert!(Requirement::parse("-").is_err());
    }

    #[test]
    fn test_with_packages_splits_excludes() {
        let set = PackageSet::new("os")
            .with_packages(["@core", "-dracut-config-rescue", "bind"])
            .unwrap();
        assert_eq!(set.include.len(), 2);
        assert_eq!(set.excludes().count(), 1);
    }

    #[test]
    fn test_module_streams() {
        let set = PackageSet::new("os").with_modules(["nodejs:18"]);
        assert_eq!(
            set.module_streams().unwrap(),
            vec![("nodejs".to_string(), "18".to_string())]
        );
        assert!(PackageSet::new("os").with_modules(["nodejs"]).module_streams().is_err());
    }

    #[test]
    fn test_chain_validation() {
        let ok = PackageSetChain::new(
            "os",
            vec![
                PackageSet::new("build"),
                PackageSet::new("os").with_base("build", PriorMode::Installed),
            ],
        );
        assert!(ok.validate().is_ok());

        let forward = PackageSetChain::new(
            "os",
            vec![
                PackageSet::new("build").with_base("os", PriorMode::Include),
                PackageSet::new("os"),
            ],
        );
        assert!(matches!(forward.validate(), Err(Error::Config(_))));

        let duplicate =
            PackageSetChain::new("os", vec![PackageSet::new("a"), PackageSet::new("a")]);
        assert!(duplicate.validate().is_err());

        let self_ref = PackageSetChain::new(
            "os",
            vec![PackageSet::new("a").with_base("a", PriorMode::Include)],
        );
        assert!(self_ref.validate().is_err());
    }

    #[test]
    fn test_package_set_deserializes_with_defaults() {
        let set: PackageSet = serde_json::from_str(
            r#"{"name": "os", "include": ["bind", "kernel >= 5.14"], "exclude": ["firewalld"]}"#,
        )
        .unwrap();
        assert_eq!(set.include.len(), 2);
        assert_eq!(set.exclude[0].name, "firewalld");
        assert!(set.repositories.is_empty());
        assert!(set.base.is_none());
    }
}
