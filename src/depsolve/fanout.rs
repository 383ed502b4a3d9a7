// src/depsolve/fanout.rs

//! Cross-architecture resolution
//!
//! Each architecture gets its own [`Solver`] derived from the shared
//! [`BaseSolver`] and resolves its chains on a rayon worker. Failures are
//! collected per architecture; nothing crosses from one architecture's
//! results into another's.

use crate::cancel::Cancellation;
use crate::error::{ArchErrors, Error, Result};
use crate::packageset::PackageSetChain;
use crate::repository::RepoConfig;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use super::chain::{BatchMode, BatchResult};
use super::context::{BaseSolver, Solver};

/// Distribution every architecture of a request targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub distro: String,
    pub platform_id: String,
    pub releasever: String,
}

/// Chains to resolve for one architecture
#[derive(Debug, Clone)]
pub struct ArchRequest {
    pub arch: String,
    /// Default repositories for sets that list none
    pub repositories: Vec<RepoConfig>,
    pub chains: BTreeMap<String, PackageSetChain>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FanoutOptions {
    /// Worker threads; 0 runs one per architecture
    pub workers: usize,
    /// Cancel outstanding architectures after the first failure
    pub fail_fast: bool,
    pub mode: BatchMode,
}

/// Per-architecture results and failures
#[derive(Debug, Default)]
pub struct MultiArchResult {
    pub resolved: BTreeMap<String, BatchResult>,
    pub errors: ArchErrors,
}

impl MultiArchResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.resolved.values().all(BatchResult::is_complete)
    }
}

impl BaseSolver {
    /// Resolve every architecture of a request in parallel
    ///
    /// Only request-level problems (duplicate architectures, a worker pool
    /// that cannot start) fail the call. Per-architecture failures land in
    /// [`MultiArchResult::errors`].
    pub fn resolve_arches(
        &self,
        target: &Target,
        requests: &[ArchRequest],
        options: FanoutOptions,
        cancel: &Cancellation,
    ) -> Result<MultiArchResult> {
        let mut seen = HashSet::new();
        for request in requests {
            if !seen.insert(request.arch.as_str()) {
                return Err(Error::Config(format!(
                    "architecture '{}' requested twice",
                    request.arch
                )));
            }
        }

        let workers = if options.workers == 0 {
            requests.len().max(1)
        } else {
            options.workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Config(format!("failed to start worker pool: {}", e)))?;

        info!(
            "Resolving {} architecture(s) with {} worker(s)",
            requests.len(),
            workers
        );

        let shared = cancel.child();
        let outcomes: Vec<(String, Result<BatchResult>)> = pool.install(|| {
            requests
                .par_iter()
                .map(|request| {
                    let outcome = self.resolve_arch(target, request, options.mode, &shared);
                    if let Err(e) = &outcome {
                        warn!("Architecture {} failed: {}", request.arch, e);
                        if options.fail_fast && !e.is_cancelled() {
                            shared.cancel();
                        }
                    }
                    (request.arch.clone(), outcome)
                })
                .collect()
        });

        let mut result = MultiArchResult::default();
        for (arch, outcome) in outcomes {
            match outcome {
                Ok(batch) => {
                    result.resolved.insert(arch, batch);
                }
                Err(e) => result.errors.push(arch, e),
            }
        }
        result.errors.sort();
        Ok(result)
    }

    fn resolve_arch(
        &self,
        target: &Target,
        request: &ArchRequest,
        mode: BatchMode,
        cancel: &Cancellation,
    ) -> Result<BatchResult> {
        let solver: Solver = self
            .derive(
                &target.platform_id,
                &target.releasever,
                &request.arch,
                &target.distro,
            )?
            .with_repositories(request.repositories.clone());
        solver.resolve_chains(&request.chains, mode, cancel)
    }
}
