// src/depsolve/context.rs

//! Solver contexts
//!
//! A [`BaseSolver`] holds what every resolution of a session shares: the
//! metadata cache handle and the metadata fetcher. [`BaseSolver::derive`]
//! produces a [`Solver`] bound to one (distribution, architecture)
//! configuration. Solvers never mutate their configuration; reconfiguring
//! means deriving a new one.

use crate::arch::Arch;
use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::hash::request_digest;
use crate::package_spec::PackageSpec;
use crate::packageset::{PackageSet, PriorMode};
use crate::repository::{CacheKey, MetadataCache, MetadataFetcher, RepoConfig, RepositoryClient};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::engine::{self, Prior, Resolved};
use super::universe::Universe;

/// Session-wide solver state shared by every derived [`Solver`]
#[derive(Clone)]
pub struct BaseSolver {
    cache: Arc<MetadataCache>,
    fetcher: Arc<dyn MetadataFetcher>,
}

impl BaseSolver {
    /// Open the metadata cache at `cache_dir` and fetch with [`RepositoryClient`]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache = Arc::new(MetadataCache::open(cache_dir)?);
        Ok(Self {
            cache,
            fetcher: Arc::new(RepositoryClient::new()?),
        })
    }

    /// Use an existing cache handle and fetcher
    pub fn with_parts(cache: Arc<MetadataCache>, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        Self { cache, fetcher }
    }

    /// Replace the metadata fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Derive a solver for one distribution and architecture
    ///
    /// Validation only: no I/O happens until the first resolve.
    pub fn derive(
        &self,
        platform_id: &str,
        releasever: &str,
        arch: &str,
        distro: &str,
    ) -> Result<Solver> {
        let arch = Arch::parse(arch)?;
        if distro.trim().is_empty() {
            return Err(Error::Config("distribution name must not be empty".to_string()));
        }

        Ok(Solver {
            platform_id: platform_id.to_string(),
            releasever: releasever.to_string(),
            arch,
            distro: distro.to_string(),
            cache: self.cache.clone(),
            fetcher: self.fetcher.clone(),
            repositories: Vec::new(),
            memo: Mutex::new(HashMap::new()),
        })
    }
}

/// A solver bound to one distribution and architecture
pub struct Solver {
    platform_id: String,
    releasever: String,
    arch: Arch,
    distro: String,
    cache: Arc<MetadataCache>,
    fetcher: Arc<dyn MetadataFetcher>,
    /// Used by package sets that list no repositories
    repositories: Vec<RepoConfig>,
    memo: Mutex<HashMap<u128, Arc<Vec<Resolved>>>>,
}

/// Everything a resolution depends on, hashed into the memo key
#[derive(Serialize)]
struct MemoKey<'a> {
    platform_id: &'a str,
    arch: Arch,
    set: &'a PackageSet,
    repositories: Vec<String>,
    prior_mode: Option<PriorMode>,
    prior: Vec<&'a PackageSpec>,
}

impl Solver {
    /// Default repositories for package sets that list none
    pub fn with_repositories(mut self, repositories: Vec<RepoConfig>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn distro(&self) -> &str {
        &self.distro
    }

    pub fn platform_id(&self) -> &str {
        &self.platform_id
    }

    pub fn releasever(&self) -> &str {
        &self.releasever
    }

    pub fn repositories(&self) -> &[RepoConfig] {
        &self.repositories
    }

    /// Resolve one package set
    pub fn depsolve(&self, set: &PackageSet) -> Result<Vec<PackageSpec>> {
        self.depsolve_with(set, &Cancellation::new())
    }

    /// Resolve one package set, honouring `cancel`
    pub fn depsolve_with(
        &self,
        set: &PackageSet,
        cancel: &Cancellation,
    ) -> Result<Vec<PackageSpec>> {
        let resolved = self.solve(set, None, cancel)?;
        Ok(resolved.iter().map(|r| r.spec.clone()).collect())
    }

    /// Substitute `$releasever` and `$basearch` in a repository reference
    fn expand(&self, repo: &RepoConfig) -> RepoConfig {
        let mut repo = repo.clone();
        repo.baseurl = repo
            .baseurl
            .replace("$releasever", &self.releasever)
            .replace("$basearch", self.arch.as_str());
        repo
    }

    /// Repositories a set searches, in order
    fn effective_repositories(&self, set: &PackageSet) -> Result<Vec<RepoConfig>> {
        let source = if set.repositories.is_empty() {
            &self.repositories
        } else {
            &set.repositories
        };
        let repos: Vec<RepoConfig> = source
            .iter()
            .filter(|r| r.applies_to(self.arch))
            .map(|r| self.expand(r))
            .collect();

        if repos.is_empty() {
            return Err(Error::Config(format!(
                "package set '{}' has no enabled repositories for {}",
                set.name, self.arch
            )));
        }
        Ok(repos)
    }

    /// Fetch (or load from cache) every effective repository
    fn load_universe(
        &self,
        set: &PackageSet,
        repos: Vec<RepoConfig>,
        cancel: &Cancellation,
    ) -> Result<Universe> {
        let mut loaded = Vec::with_capacity(repos.len());
        for repo in repos {
            cancel.check()?;
            let key = CacheKey::new(self.distro.clone(), self.arch, &repo);
            match self
                .cache
                .get_or_fetch(&key, &repo, self.fetcher.as_ref(), cancel)
            {
                Ok(data) => loaded.push((repo, data)),
                Err(e) if repo.skip_if_unavailable && !e.is_cancelled() => {
                    warn!("Skipping unavailable repository {}: {}", repo.id, e);
                }
                Err(e) => return Err(e),
            }
        }

        let enabled: HashMap<String, String> = set.module_streams()?.into_iter().collect();
        Ok(Universe::build(self.arch, &self.platform_id, loaded, &enabled))
    }

    pub(crate) fn solve(
        &self,
        set: &PackageSet,
        prior: Option<Prior<'_>>,
        cancel: &Cancellation,
    ) -> Result<Arc<Vec<Resolved>>> {
        cancel.check()?;
        let repos = self.effective_repositories(set)?;

        let key = MemoKey {
            platform_id: &self.platform_id,
            arch: self.arch,
            set,
            repositories: repos.iter().map(|r| r.fingerprint()).collect(),
            prior_mode: prior.as_ref().map(|p| p.mode),
            prior: prior
                .as_ref()
                .map(|p| p.packages.iter().map(|r| &r.spec).collect())
                .unwrap_or_default(),
        };
        let digest = request_digest(&serde_json::to_vec(&key)?);
        if let Some(hit) = self.memo.lock().get(&digest) {
            debug!("Reusing resolution of package set '{}'", set.name);
            return Ok(hit.clone());
        }

        let universe = self.load_universe(set, repos, cancel)?;
        let resolved = Arc::new(engine::resolve(&universe, set, prior, cancel)?);
        info!(
            "Resolved package set '{}' for {}: {} packages",
            set.name,
            self.arch,
            resolved.len()
        );

        self.memo.lock().insert(digest, resolved.clone());
        Ok(resolved)
    }
}
