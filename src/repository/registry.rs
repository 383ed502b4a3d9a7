// src/repository/registry.rs

//! Repository definition loading
//!
//! Definitions live in `<dir>/<distro>.json` (or `<dir>/repositories/<distro>.json`)
//! and map an architecture to its ordered repository list:
//!
//! ```json
//! { "x86_64": [ { "name": "baseos", "baseurl": "https://...", "check_gpg": true } ] }
//! ```

use crate::arch::Arch;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::config::{DEFAULT_PRIORITY, MetadataFormat, RepoConfig};

/// Architecture name → ordered repositories
pub type RepositoryMap = BTreeMap<String, Vec<RepoConfig>>;

/// One entry of a definition file
#[derive(Debug, Deserialize)]
struct RepoDefinition {
    #[serde(default)]
    id: Option<String>,
    name: String,
    baseurl: String,
    #[serde(default)]
    format: MetadataFormat,
    #[serde(default)]
    gpgkey: Option<String>,
    #[serde(default)]
    gpgkeys: Vec<String>,
    #[serde(default)]
    check_gpg: bool,
    #[serde(default)]
    check_repo_gpg: bool,
    #[serde(default)]
    ignore_ssl: bool,
    #[serde(default)]
    module_hotfixes: bool,
    #[serde(default)]
    skip_if_unavailable: bool,
    #[serde(default)]
    priority: Option<i32>,
}

impl RepoDefinition {
    fn into_config(self, arch: Arch) -> RepoConfig {
        let mut gpg_keys = self.gpgkeys;
        if let Some(key) = self.gpgkey {
            gpg_keys.insert(0, key);
        }

        RepoConfig {
            id: self.id.unwrap_or(self.name),
            baseurl: self.baseurl,
            format: self.format,
            enabled: true,
            arches: vec![arch],
            check_gpg: self.check_gpg,
            check_repo_gpg: self.check_repo_gpg,
            gpg_keys,
            ignore_ssl: self.ignore_ssl,
            module_hotfixes: self.module_hotfixes,
            skip_if_unavailable: self.skip_if_unavailable,
            priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
        }
    }
}

/// Candidate definition files for a distro under one directory
fn candidate_files(dir: &Path, distro: &str) -> [PathBuf; 2] {
    let file = format!("{}.json", distro);
    [dir.join(&file), dir.join("repositories").join(&file)]
}

/// Parse one definition file
pub fn load_repository_file(path: &Path) -> Result<RepositoryMap> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Parse(format!("Failed to read {}: {}", path.display(), e)))?;

    let raw: BTreeMap<String, Vec<RepoDefinition>> = serde_json::from_str(&content)
        .map_err(|e| Error::Parse(format!("Failed to parse {}: {}", path.display(), e)))?;

    let mut repos = RepositoryMap::new();
    for (arch_name, definitions) in raw {
        let arch = Arch::parse(&arch_name).map_err(|_| {
            Error::Parse(format!(
                "Unknown architecture '{}' in {}",
                arch_name,
                path.display()
            ))
        })?;
        let configs = definitions
            .into_iter()
            .map(|d| d.into_config(arch))
            .collect();
        repos.insert(arch_name, configs);
    }

    Ok(repos)
}

/// Load repositories for `distro` from the first directory that defines them
pub fn load_repositories<P: AsRef<Path>>(paths: &[P], distro: &str) -> Result<RepositoryMap> {
    if distro.is_empty() {
        return Err(Error::Config("distribution name must not be empty".to_string()));
    }

    for dir in paths {
        for file in candidate_files(dir.as_ref(), distro) {
            if !file.is_file() {
                debug!("No repository definitions at {}", file.display());
                continue;
            }

            let repos = load_repository_file(&file)?;
            info!(
                "Loaded repositories for {} architecture(s) of {} from {}",
                repos.len(),
                distro,
                file.display()
            );
            return Ok(repos);
        }
    }

    let searched: Vec<String> = paths
        .iter()
        .map(|p| p.as_ref().display().to_string())
        .collect();
    Err(Error::Parse(format!(
        "No repository definitions for '{}' in {}",
        distro,
        searched.join(", ")
    )))
}
