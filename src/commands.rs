// src/commands.rs
//! Command handlers for the depsolve CLI

use anyhow::{Context, Result};
use depsolve::config::{DriverConfig, Request};
use depsolve::repository::{RepositoryMap, load_repositories};
use depsolve::{
    BaseSolver, BatchResult, Cancellation, ChainOutcome, MetadataCache, MultiArchResult,
    PackageSpec, SetResult,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Options of the resolve command that override the configuration file
pub struct ResolveOverrides {
    pub workers: Option<usize>,
    pub fail_fast: bool,
    pub best_effort: bool,
    pub timeout: Option<u64>,
}

/// Load the configuration file, or the defaults when it does not exist
pub fn load_config(
    path: &Path,
    cache_dir: Option<PathBuf>,
    distro: Option<String>,
) -> Result<DriverConfig> {
    let mut config = if path.exists() {
        DriverConfig::load(path)?
    } else {
        info!("No configuration at {}, using defaults", path.display());
        DriverConfig::default()
    };

    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    if let Some(distro) = distro {
        config.distro = distro;
    }
    Ok(config)
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ChainReport<'a> {
    Resolved {
        packages: Vec<PackageSpec>,
        sets: &'a [SetResult],
    },
    Failed {
        error: String,
    },
}

#[derive(Serialize)]
struct ArchReport<'a> {
    chains: BTreeMap<&'a str, ChainReport<'a>>,
}

#[derive(Serialize)]
struct Report<'a> {
    arches: BTreeMap<&'a str, ArchReport<'a>>,
    errors: BTreeMap<&'a str, String>,
}

impl<'a> Report<'a> {
    fn new(result: &'a MultiArchResult) -> Self {
        let arches = result
            .resolved
            .iter()
            .map(|(arch, batch)| (arch.as_str(), Self::arch(batch)))
            .collect();
        let errors = result
            .errors
            .iter()
            .map(|(arch, e)| (arch, e.to_string()))
            .collect();
        Self { arches, errors }
    }

    fn arch(batch: &'a BatchResult) -> ArchReport<'a> {
        let chains = batch
            .chains
            .iter()
            .map(|(name, outcome)| {
                let report = match outcome {
                    ChainOutcome::Resolved(r) => ChainReport::Resolved {
                        packages: r.packages(),
                        sets: &r.sets,
                    },
                    ChainOutcome::Failed(e) => ChainReport::Failed {
                        error: e.to_string(),
                    },
                };
                (name.as_str(), report)
            })
            .collect();
        ArchReport { chains }
    }
}

/// Resolve a request file and print (or write) the JSON result
pub fn cmd_resolve(
    mut config: DriverConfig,
    request_path: &Path,
    output: Option<&Path>,
    overrides: ResolveOverrides,
) -> Result<()> {
    if let Some(workers) = overrides.workers {
        config.workers = workers;
    }
    config.fail_fast |= overrides.fail_fast;
    config.best_effort |= overrides.best_effort;
    config.validate()?;

    let request = Request::load(request_path)?;
    let defaults = if request.is_self_contained() {
        RepositoryMap::new()
    } else {
        load_repositories(&config.repo_dirs, &config.distro)?
    };

    let cancel = match overrides.timeout {
        Some(secs) => Cancellation::with_timeout(Duration::from_secs(secs)),
        None => Cancellation::new(),
    };

    info!(
        "Resolving {} architecture(s) of {} with cache {}",
        request.arches.len(),
        config.distro,
        config.cache_dir.display()
    );
    let base = BaseSolver::new(&config.cache_dir)?;
    let result = base.resolve_arches(
        &config.target(),
        &request.arch_requests(&defaults),
        config.fanout_options(),
        &cancel,
    )?;

    let json = serde_json::to_string_pretty(&Report::new(&result))?;
    match output {
        Some(path) => {
            fs::write(path, json.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote result to {}", path.display());
        }
        None => println!("{}", json),
    }

    let stats = base.cache().stats();
    info!("Metadata cache: {} fetches, {} hits", stats.fetches, stats.hits);

    if !result.errors.is_empty() {
        return Err(result.errors.into());
    }
    let failed: Vec<String> = result
        .resolved
        .iter()
        .flat_map(|(arch, batch)| {
            batch
                .failed()
                .map(move |(chain, _)| format!("{}/{}", arch, chain))
        })
        .collect();
    if !failed.is_empty() {
        warn!("Failed chains: {}", failed.join(", "));
        anyhow::bail!("{} chain(s) failed", failed.len());
    }
    Ok(())
}

/// List repository definitions for the configured distribution
pub fn cmd_repos(config: &DriverConfig, arch: Option<&str>) -> Result<()> {
    config.validate()?;
    let repos = load_repositories(&config.repo_dirs, &config.distro)?;

    for (name, list) in &repos {
        if arch.is_some_and(|a| a != name) {
            continue;
        }
        println!("{} ({} repositories):", name, list.len());
        for repo in list {
            let mut flags = Vec::new();
            if repo.check_gpg {
                flags.push("gpg");
            }
            if repo.skip_if_unavailable {
                flags.push("optional");
            }
            if repo.module_hotfixes {
                flags.push("module-hotfixes");
            }
            println!(
                "  {} [{}, priority {}] {}",
                repo.id,
                repo.format.name(),
                repo.priority,
                repo.baseurl
            );
            if !flags.is_empty() {
                println!("      {}", flags.join(", "));
            }
        }
    }
    Ok(())
}

/// Show cached repository metadata
pub fn cmd_cache_list(config: &DriverConfig) -> Result<()> {
    let cache = MetadataCache::open(&config.cache_dir)?;
    let entries = cache.entries()?;

    if entries.is_empty() {
        println!("Cache at {} is empty", config.cache_dir.display());
        return Ok(());
    }

    println!("{} cached repositories in {}:", entries.len(), config.cache_dir.display());
    for (path, index) in entries {
        println!(
            "  {}/{}/{} ({} packages, fetched {})",
            index.distro,
            index.arch,
            index.repo_id,
            index.packages,
            index.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("      {}", path.display());
    }
    Ok(())
}

/// Remove cached metadata, optionally only entries older than `older_than` days
pub fn cmd_clean_cache(config: &DriverConfig, older_than: Option<u64>) -> Result<()> {
    let cache = MetadataCache::open(&config.cache_dir)?;
    match older_than {
        Some(days) => {
            let removed = cache.clear_older_than(Duration::from_secs(days * 24 * 60 * 60))?;
            println!("Removed {} cache entries older than {} days", removed, days);
        }
        None => {
            cache.clear()?;
            println!("Cleared cache at {}", config.cache_dir.display());
        }
    }
    Ok(())
}
