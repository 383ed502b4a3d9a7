// src/config.rs
//! Driver configuration and request files
//!
//! The `depsolve` binary reads a TOML configuration:
//!
//! ```toml
//! cache_dir = "/var/cache/depsolve"
//! distro = "centos-9"
//! platform_id = "platform:el9"
//! releasever = "9"
//! repo_dirs = ["/usr/share/depsolve/repositories"]
//! workers = 0
//! fail_fast = false
//! best_effort = false
//! ```
//!
//! and a JSON request naming the package set chains per architecture:
//!
//! ```json
//! { "arches": { "x86_64": { "chains": { "image": [ { "name": "os", "include": ["bind"] } ] } } } }
//! ```

use crate::depsolve::{ArchRequest, BatchMode, FanoutOptions, Target};
use crate::error::{Error, Result};
use crate::packageset::{PackageSet, PackageSetChain};
use crate::repository::{RepoConfig, RepositoryMap};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// TOML configuration of the driver
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriverConfig {
    /// Metadata cache directory, shared by every architecture
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Distribution name, e.g. `centos-9`
    #[serde(default)]
    pub distro: String,

    /// Module platform, e.g. `platform:el9`
    #[serde(default)]
    pub platform_id: String,

    /// Value substituted for `$releasever`
    #[serde(default)]
    pub releasever: String,

    /// Directories searched for `<distro>.json` repository definitions
    #[serde(default = "default_repo_dirs")]
    pub repo_dirs: Vec<PathBuf>,

    /// Worker threads (0 = one per architecture)
    #[serde(default)]
    pub workers: usize,

    /// Stop outstanding architectures after the first failure
    #[serde(default)]
    pub fail_fast: bool,

    /// Report failed chains next to successful ones
    #[serde(default)]
    pub best_effort: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            distro: String::new(),
            platform_id: String::new(),
            releasever: String::new(),
            repo_dirs: default_repo_dirs(),
            workers: 0,
            fail_fast: false,
            best_effort: false,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/depsolve")
}

fn default_repo_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("/usr/share/depsolve/repositories")]
}

impl DriverConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Check the values needed to resolve
    pub fn validate(&self) -> Result<()> {
        if self.distro.trim().is_empty() {
            return Err(Error::Config("distro must be set".to_string()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("cache_dir must be set".to_string()));
        }
        Ok(())
    }

    pub fn target(&self) -> Target {
        Target {
            distro: self.distro.clone(),
            platform_id: self.platform_id.clone(),
            releasever: self.releasever.clone(),
        }
    }

    pub fn fanout_options(&self) -> FanoutOptions {
        FanoutOptions {
            workers: self.workers,
            fail_fast: self.fail_fast,
            mode: if self.best_effort {
                BatchMode::BestEffort
            } else {
                BatchMode::Strict
            },
        }
    }
}

/// Chains and repositories of one architecture in a request file
#[derive(Debug, Clone, Deserialize)]
pub struct ArchSection {
    /// Repositories overriding the distribution definitions
    #[serde(default)]
    pub repositories: Option<Vec<RepoConfig>>,

    /// Chain name → ordered package sets
    #[serde(default)]
    pub chains: BTreeMap<String, Vec<PackageSet>>,
}

/// A resolve request file
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub arches: BTreeMap<String, ArchSection>,
}

impl Request {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read(path).map_err(|e| {
            Error::Config(format!("Failed to read request {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&content).map_err(|e| {
            Error::Config(format!("Failed to parse request {}: {}", path.display(), e))
        })
    }

    /// Per-architecture requests, falling back to `defaults` for
    /// architectures that list no repositories
    pub fn arch_requests(&self, defaults: &RepositoryMap) -> Vec<ArchRequest> {
        self.arches
            .iter()
            .map(|(arch, section)| ArchRequest {
                arch: arch.clone(),
                repositories: section
                    .repositories
                    .clone()
                    .or_else(|| defaults.get(arch).cloned())
                    .unwrap_or_default(),
                chains: section
                    .chains
                    .iter()
                    .map(|(name, sets)| {
                        (name.clone(), PackageSetChain::new(name.clone(), sets.clone()))
                    })
                    .collect(),
            })
            .collect()
    }

    /// Whether every architecture brings its own repositories
    pub fn is_self_contained(&self) -> bool {
        self.arches.values().all(|a| a.repositories.is_some())
    }
}
