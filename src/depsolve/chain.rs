// src/depsolve/chain.rs

//! Chain sequencing
//!
//! Sets of a chain resolve in declared order. A set with a `base`
//! reference receives the resolved packages of that earlier set before
//! resolution. The first failing set aborts the rest of its chain.

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::package_spec::{PackageSpec, normalize};
use crate::packageset::PackageSetChain;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use super::context::Solver;
use super::engine::{Prior, Resolved};

/// Resolved packages of one set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetResult {
    pub name: String,
    pub packages: Vec<PackageSpec>,
}

/// Resolved packages of every set of a chain, in declared order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainResolution {
    pub name: String,
    pub sets: Vec<SetResult>,
}

impl ChainResolution {
    /// Every package the chain selected, deduplicated and in output order
    pub fn packages(&self) -> Vec<PackageSpec> {
        normalize(
            self.sets
                .iter()
                .flat_map(|s| s.packages.iter().cloned())
                .collect(),
        )
    }

    pub fn set(&self, name: &str) -> Option<&SetResult> {
        self.sets.iter().find(|s| s.name == name)
    }
}

/// How a batch treats failing chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// The first failing chain fails the batch
    #[default]
    Strict,
    /// Failures are recorded per chain next to the successes
    BestEffort,
}

/// Outcome of one chain in a batch
#[derive(Debug)]
pub enum ChainOutcome {
    Resolved(ChainResolution),
    Failed(Error),
}

impl ChainOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ChainOutcome::Resolved(_))
    }

    pub fn resolution(&self) -> Option<&ChainResolution> {
        match self {
            ChainOutcome::Resolved(r) => Some(r),
            ChainOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            ChainOutcome::Resolved(_) => None,
            ChainOutcome::Failed(e) => Some(e),
        }
    }
}

/// Result of a batch: exactly one outcome per requested chain
#[derive(Debug, Default)]
pub struct BatchResult {
    pub chains: BTreeMap<String, ChainOutcome>,
}

impl BatchResult {
    pub fn get(&self, chain: &str) -> Option<&ChainOutcome> {
        self.chains.get(chain)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.chains
            .iter()
            .filter_map(|(name, o)| o.error().map(|e| (name.as_str(), e)))
    }

    pub fn is_complete(&self) -> bool {
        self.chains.values().all(ChainOutcome::is_resolved)
    }
}

impl Solver {
    /// Resolve the sets of `chain` in order
    pub fn resolve_chain(&self, chain: &PackageSetChain) -> Result<ChainResolution> {
        self.resolve_chain_with(chain, &Cancellation::new())
    }

    pub fn resolve_chain_with(
        &self,
        chain: &PackageSetChain,
        cancel: &Cancellation,
    ) -> Result<ChainResolution> {
        chain.validate()?;

        let mut done: HashMap<&str, Arc<Vec<Resolved>>> = HashMap::new();
        let mut sets = Vec::with_capacity(chain.sets.len());

        for set in &chain.sets {
            info!("Resolving package set '{}' of chain '{}'", set.name, chain.name);

            let prior = match &set.base {
                Some(base) => {
                    // validate() guarantees the base was resolved earlier
                    let packages = done.get(base.set.as_str()).ok_or_else(|| {
                        Error::Config(format!("unknown package set '{}'", base.set))
                    })?;
                    Some(Prior {
                        set: &base.set,
                        mode: base.mode,
                        packages: packages.as_slice(),
                    })
                }
                None => None,
            };

            let resolved = self
                .solve(set, prior, cancel)
                .map_err(|e| e.in_chain(&chain.name, &set.name))?;

            sets.push(SetResult {
                name: set.name.clone(),
                packages: resolved.iter().map(|r| r.spec.clone()).collect(),
            });
            done.insert(set.name.as_str(), resolved);
        }

        info!(
            "Resolved chain '{}' for {} ({} sets)",
            chain.name,
            self.arch(),
            sets.len()
        );
        Ok(ChainResolution {
            name: chain.name.clone(),
            sets,
        })
    }

    /// Resolve several independent chains
    ///
    /// The map keys name the results; a chain's own name is only used in
    /// error messages. In [`BatchMode::Strict`] the first failure is
    /// returned; in [`BatchMode::BestEffort`] every chain gets an outcome.
    pub fn resolve_chains(
        &self,
        chains: &BTreeMap<String, PackageSetChain>,
        mode: BatchMode,
        cancel: &Cancellation,
    ) -> Result<BatchResult> {
        let mut result = BatchResult::default();

        for (key, chain) in chains {
            match self.resolve_chain_with(chain, cancel) {
                Ok(resolution) => {
                    result
                        .chains
                        .insert(key.clone(), ChainOutcome::Resolved(resolution));
                }
                Err(e) if mode == BatchMode::BestEffort && !e.is_cancelled() => {
                    warn!("Chain '{}' failed on {}: {}", key, self.arch(), e);
                    result.chains.insert(key.clone(), ChainOutcome::Failed(e));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }
}
