// src/depsolve/universe.rs

//! Combined candidate universe of one solve
//!
//! Packages of every effective repository that pass the architecture and
//! module filters, with lookup indices by name, provide and file.

use crate::arch::Arch;
use crate::repository::{Capability, PackageMetadata, RepoConfig, RepositoryData};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::filter::{arch_compatible, module_compatible};

/// Index of a package inside the universe
pub(crate) type EntryId = usize;

struct Entry {
    repo: usize,
    package: usize,
}

pub(crate) struct Universe {
    arch: Arch,
    repos: Vec<(RepoConfig, Arc<RepositoryData>)>,
    entries: Vec<Entry>,
    by_name: HashMap<String, Vec<EntryId>>,
    by_provide: HashMap<String, Vec<EntryId>>,
    by_file: HashMap<String, Vec<EntryId>>,
}

impl Universe {
    /// Build the universe from repositories in search order
    pub(crate) fn build(
        arch: Arch,
        platform_id: &str,
        repos: Vec<(RepoConfig, Arc<RepositoryData>)>,
        enabled_modules: &HashMap<String, String>,
    ) -> Self {
        let mut entries = Vec::new();
        for (r, (repo, data)) in repos.iter().enumerate() {
            for (p, pkg) in data.packages.iter().enumerate() {
                if arch_compatible(arch, pkg)
                    && module_compatible(pkg, platform_id, enabled_modules, repo.module_hotfixes)
                {
                    entries.push(Entry { repo: r, package: p });
                }
            }
        }

        // Active modular packages hide plain packages of the same name
        let modular: HashSet<String> = entries
            .iter()
            .map(|e| &repos[e.repo].1.packages[e.package])
            .filter(|pkg| pkg.module.is_some())
            .map(|pkg| pkg.name.clone())
            .collect();
        if !modular.is_empty() {
            entries.retain(|e| {
                let (repo, data) = &repos[e.repo];
                let pkg = &data.packages[e.package];
                pkg.module.is_some() || repo.module_hotfixes || !modular.contains(&pkg.name)
            });
        }

        let mut universe = Self {
            arch,
            repos,
            entries,
            by_name: HashMap::new(),
            by_provide: HashMap::new(),
            by_file: HashMap::new(),
        };
        universe.index();
        debug!(
            "Candidate universe for {}: {} packages from {} repositories",
            arch,
            universe.len(),
            universe.repos.len()
        );
        universe
    }

    fn index(&mut self) {
        for id in 0..self.entries.len() {
            let pkg = self.package(id);
            let name = pkg.name.clone();
            let provides: Vec<String> = pkg.provides.iter().map(|p| p.name.clone()).collect();
            let files = pkg.files.clone();

            self.by_name.entry(name).or_default().push(id);
            for provide in provides {
                self.by_provide.entry(provide).or_default().push(id);
            }
            for file in files {
                self.by_file.entry(file).or_default().push(id);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn package(&self, id: EntryId) -> &PackageMetadata {
        let entry = &self.entries[id];
        &self.repos[entry.repo].1.packages[entry.package]
    }

    pub(crate) fn repo(&self, id: EntryId) -> &RepoConfig {
        &self.repos[self.entries[id].repo].0
    }

    /// Every package name in the universe, sorted
    pub(crate) fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Candidates carrying `name`, best first
    pub(crate) fn by_name(&self, name: &str) -> Vec<EntryId> {
        let mut ids = self.by_name.get(name).cloned().unwrap_or_default();
        self.sort_by_preference(&mut ids);
        ids
    }

    /// Candidates satisfying `cap` by name, provide or file, best first
    pub(crate) fn providers(&self, cap: &Capability) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = Vec::new();
        let indices = if cap.is_file() {
            [self.by_file.get(&cap.name), self.by_name.get(&cap.name)]
        } else {
            [self.by_name.get(&cap.name), self.by_provide.get(&cap.name)]
        };
        for list in indices.into_iter().flatten() {
            ids.extend(list.iter().copied());
        }
        ids.sort_unstable();
        ids.dedup();
        ids.retain(|&id| self.package(id).provides_capability(cap));
        self.sort_by_preference(&mut ids);
        ids
    }

    /// Order: repository priority, then newest version, then repository
    /// order, then native architecture before noarch
    pub(crate) fn compare(&self, a: EntryId, b: EntryId) -> Ordering {
        let (pa, pb) = (self.package(a), self.package(b));
        self.repo(a)
            .priority
            .cmp(&self.repo(b).priority)
            .then_with(|| pb.evr().cmp(&pa.evr()))
            .then_with(|| self.entries[a].repo.cmp(&self.entries[b].repo))
            .then_with(|| {
                self.arch
                    .preference(&pa.arch)
                    .cmp(&self.arch.preference(&pb.arch))
            })
            .then_with(|| a.cmp(&b))
    }

    fn sort_by_preference(&self, ids: &mut [EntryId]) {
        ids.sort_by(|&a, &b| self.compare(a, b));
    }
}
