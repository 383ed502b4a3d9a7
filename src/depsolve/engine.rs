// src/depsolve/engine.rs

//! Dependency resolution over a candidate universe
//!
//! Resolution runs in attempts. An attempt expands the include
//! requirements, closes over hard requirements breadth first, optionally
//! adds weak dependencies and checks package conflicts. When a requirement
//! needs a different build of a package an attempt already selected (or
//! one the current pins rule out), the requirement is recorded as a pin on
//! that package name and the attempt restarts.
//!
//! Every pin remembers the package whose requirement recorded it. Before a
//! restart, pins whose package the failed attempt no longer selected are
//! dropped. Attempts are deterministic in their pins, so a repeated pin set
//! means no progress is possible and the name is a dependency conflict.
//!
//! Excludes are applied to the final selection. Packages an exclude
//! matches are removed, and the result fails with an exclusion conflict
//! if a remaining package (or the set itself) still hard-requires them.
//! While choosing providers, excluded candidates are ranked last so an
//! alternative provider is used when one exists.

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::package_spec::PackageSpec;
use crate::packageset::{PackageSet, PriorMode, Requirement};
use crate::repository::{Capability, PackageMetadata, RepoConfig};
use crate::version::VersionConstraint;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::ptr;
use tracing::debug;

use super::universe::{EntryId, Universe};

/// Upper bound on restarts
const MAX_ATTEMPTS: usize = 256;

/// A resolved package together with the metadata it was resolved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Resolved {
    pub spec: PackageSpec,
    pub meta: PackageMetadata,
}

/// Result of an earlier set of the same chain
pub(crate) struct Prior<'a> {
    pub set: &'a str,
    pub mode: PriorMode,
    pub packages: &'a [Resolved],
}

/// Build the output specification for a universe package
pub(crate) fn to_spec(meta: &PackageMetadata, repo: &RepoConfig) -> PackageSpec {
    PackageSpec {
        name: meta.name.clone(),
        epoch: meta.epoch,
        version: meta.version.clone(),
        release: meta.release.clone(),
        arch: meta.arch.clone(),
        checksum: meta.checksum.clone(),
        repo_id: repo.id.clone(),
        location: meta.location.clone(),
        remote_location: repo.resolve_location(&meta.location),
        check_gpg: repo.check_gpg,
        ignore_ssl: repo.ignore_ssl,
    }
}

#[derive(Debug, Clone, Copy)]
enum Origin<'a> {
    Repo(&'a RepoConfig),
    Floor(&'a PackageSpec),
}

#[derive(Debug, Clone, Copy)]
struct Pick<'a> {
    meta: &'a PackageMetadata,
    origin: Origin<'a>,
}

impl Pick<'_> {
    fn resolved(&self) -> Resolved {
        let spec = match self.origin {
            Origin::Repo(repo) => to_spec(self.meta, repo),
            Origin::Floor(spec) => spec.clone(),
        };
        Resolved {
            spec,
            meta: self.meta.clone(),
        }
    }
}

/// A version requirement recorded against a package name
#[derive(Debug, Clone)]
struct Pin {
    constraint: VersionConstraint,
    origin: String,
    /// NEVRA of the requiring package; `None` for the set and its prior
    source: Option<String>,
}

/// Packages indexed by name, provide and file path
#[derive(Debug, Default)]
struct ProvideIndex<'a> {
    by_key: HashMap<&'a str, Vec<&'a PackageMetadata>>,
    /// Packages declaring `Conflicts:`
    conflicting: Vec<&'a PackageMetadata>,
}

impl<'a> ProvideIndex<'a> {
    fn keys(meta: &'a PackageMetadata) -> impl Iterator<Item = &'a str> {
        std::iter::once(meta.name.as_str())
            .chain(meta.provides.iter().map(|p| p.name.as_str()))
            .chain(meta.files.iter().map(String::as_str))
    }

    fn insert(&mut self, meta: &'a PackageMetadata) {
        for key in Self::keys(meta) {
            self.by_key.entry(key).or_default().push(meta);
        }
        if !meta.conflicts.is_empty() {
            self.conflicting.push(meta);
        }
    }

    fn remove(&mut self, meta: &'a PackageMetadata) {
        for key in Self::keys(meta) {
            if let Some(list) = self.by_key.get_mut(key) {
                list.retain(|m| !ptr::eq(*m, meta));
                if list.is_empty() {
                    self.by_key.remove(key);
                }
            }
        }
        self.conflicting.retain(|m| !ptr::eq(*m, meta));
    }

    fn providers(&self, cap: &Capability) -> impl Iterator<Item = &'a PackageMetadata> {
        self.by_key
            .get(cap.name.as_str())
            .into_iter()
            .flatten()
            .copied()
            .filter(move |m| m.provides_capability(cap))
    }

    fn named(&self, name: &str) -> Option<&'a PackageMetadata> {
        self.by_key
            .get(name)?
            .iter()
            .copied()
            .find(|m| m.name == name)
    }
}

#[derive(Debug, Default)]
struct State<'a> {
    chosen: BTreeMap<String, Pick<'a>>,
    index: ProvideIndex<'a>,
    /// Names in selection order
    order: Vec<String>,
    /// Names whose requirements still need processing
    queue: VecDeque<String>,
}

impl<'a> State<'a> {
    fn select(&mut self, pick: Pick<'a>) {
        let name = pick.meta.name.clone();
        self.index.insert(pick.meta);
        self.order.push(name.clone());
        self.queue.push_back(name.clone());
        self.chosen.insert(name, pick);
    }

    fn provides(&self, cap: &Capability) -> bool {
        self.index.providers(cap).next().is_some()
    }

    fn mark(&self) -> usize {
        self.order.len()
    }

    fn added_since(&self, mark: usize) -> Vec<&'a PackageMetadata> {
        self.order[mark..]
            .iter()
            .filter_map(|name| self.chosen.get(name))
            .map(|p| p.meta)
            .collect()
    }

    /// Forget everything selected after `mark`
    fn rollback(&mut self, mark: usize) {
        for name in self.order.drain(mark..) {
            if let Some(pick) = self.chosen.remove(&name) {
                self.index.remove(pick.meta);
            }
        }
        self.queue.clear();
    }
}

enum Failure {
    /// Restart with an additional pin
    Retry { package: String, pin: Pin },
    Error(Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Failure::Error(e)
    }
}

type Step<T> = std::result::Result<T, Failure>;

fn conflict_error(pkg: &PackageMetadata, cap: &Capability, other: &PackageMetadata) -> Error {
    Error::DependencyConflict {
        package: other.name.clone(),
        requirements: vec![
            format!("{} conflicts with {}", pkg.nevra(), cap),
            format!("{} is selected", other.nevra()),
        ],
    }
}

struct Engine<'a> {
    universe: &'a Universe,
    set: &'a PackageSet,
    excludes: Vec<&'a Requirement>,
    floor: Vec<&'a Resolved>,
    installed: Vec<&'a PackageMetadata>,
    installed_index: ProvideIndex<'a>,
    pins: BTreeMap<String, Vec<Pin>>,
    cancel: &'a Cancellation,
}

/// Resolve `set` against `universe`
pub(crate) fn resolve(
    universe: &Universe,
    set: &PackageSet,
    prior: Option<Prior<'_>>,
    cancel: &Cancellation,
) -> Result<Vec<Resolved>> {
    let mut engine = Engine::new(universe, set, prior.as_ref(), cancel);
    let mut tried = HashSet::new();
    tried.insert(engine.signature());
    let mut last = String::new();

    for attempt in 1..=MAX_ATTEMPTS {
        cancel.check()?;
        let mut state = State::default();
        match engine.attempt(&mut state) {
            Ok(()) => {
                debug!(
                    "Package set '{}' resolved after {} attempt(s)",
                    set.name, attempt
                );
                return engine.finish(&state);
            }
            Err(Failure::Retry { package, pin }) => {
                debug!("Pinning {} to {} ({})", package, pin.constraint, pin.origin);
                engine.drop_stale_pins(&state);
                let origin = pin.origin.clone();
                engine.pins.entry(package.clone()).or_default().push(pin);
                if !tried.insert(engine.signature()) {
                    return Err(engine.conflict(&package, Some(&origin)));
                }
                last = package;
            }
            Err(Failure::Error(e)) => return Err(e),
        }
    }

    Err(engine.conflict(&last, None))
}

impl<'a> Engine<'a> {
    fn new(
        universe: &'a Universe,
        set: &'a PackageSet,
        prior: Option<&Prior<'a>>,
        cancel: &'a Cancellation,
    ) -> Self {
        let excludes: Vec<&Requirement> = set.excludes().collect();
        let mut engine = Self {
            universe,
            set,
            excludes,
            floor: Vec::new(),
            installed: Vec::new(),
            installed_index: ProvideIndex::default(),
            pins: BTreeMap::new(),
            cancel,
        };

        if let Some(prior) = prior {
            for resolved in prior.packages {
                // Explicit excludes win over inherited selections
                if engine.is_excluded(&resolved.meta) {
                    debug!(
                        "Dropping {} inherited from '{}': excluded by '{}'",
                        resolved.spec, prior.set, set.name
                    );
                    continue;
                }
                let verb = match prior.mode {
                    PriorMode::Include => {
                        engine.floor.push(resolved);
                        "selected"
                    }
                    PriorMode::Installed => {
                        engine.installed.push(&resolved.meta);
                        engine.installed_index.insert(&resolved.meta);
                        "installed"
                    }
                };
                engine.pin(
                    &resolved.meta.name,
                    VersionConstraint::Exact(resolved.meta.evr()),
                    format!("set '{}' {} {}", prior.set, verb, resolved.spec),
                );
            }
        }

        for req in set.includes() {
            if !req.is_glob() && req.constraint != VersionConstraint::Any {
                let origin = engine.include_origin(req);
                engine.pin(&req.name, req.constraint.clone(), origin);
            }
        }

        engine
    }

    fn pin(&mut self, name: &str, constraint: VersionConstraint, origin: String) {
        self.pins.entry(name.to_string()).or_default().push(Pin {
            constraint,
            origin,
            source: None,
        });
    }

    /// Drop pins recorded by packages `state` did not select
    fn drop_stale_pins(&mut self, state: &State<'a>) {
        let selected: HashSet<String> = state.chosen.values().map(|p| p.meta.nevra()).collect();
        for (name, pins) in self.pins.iter_mut() {
            pins.retain(|pin| match &pin.source {
                Some(source) if !selected.contains(source) => {
                    debug!("Dropping pin {} {} ({})", name, pin.constraint, pin.origin);
                    false
                }
                _ => true,
            });
        }
        self.pins.retain(|_, pins| !pins.is_empty());
    }

    fn signature(&self) -> BTreeSet<(String, String, Option<String>)> {
        self.pins
            .iter()
            .flat_map(|(name, pins)| {
                pins.iter()
                    .map(move |p| (name.clone(), p.constraint.to_string(), p.source.clone()))
            })
            .collect()
    }

    fn include_origin(&self, req: &Requirement) -> String {
        format!("package set '{}' requires {}", self.set.name, req)
    }

    fn set_label(&self) -> String {
        format!("package set '{}'", self.set.name)
    }

    fn meta(&self, id: EntryId) -> &'a PackageMetadata {
        let universe: &'a Universe = self.universe;
        universe.package(id)
    }

    fn is_excluded(&self, pkg: &PackageMetadata) -> bool {
        self.excludes
            .iter()
            .any(|r| r.matches_name(&pkg.name) && r.constraint.satisfies(&pkg.evr()))
    }

    fn pins_allow(&self, pkg: &PackageMetadata) -> bool {
        self.pins
            .get(&pkg.name)
            .is_none_or(|pins| pins.iter().all(|p| p.constraint.satisfies(&pkg.evr())))
    }

    fn is_installed_name(&self, name: &str) -> bool {
        self.installed_index.named(name).is_some()
    }

    /// Dependency conflict naming every requirement recorded on `package`
    fn conflict(&self, package: &str, extra: Option<&str>) -> Error {
        let mut requirements: Vec<String> = self
            .pins
            .get(package)
            .map(|pins| pins.iter().map(|p| p.origin.clone()).collect())
            .unwrap_or_default();
        if let Some(extra) = extra
            && !requirements.iter().any(|r| r == extra)
        {
            requirements.push(extra.to_string());
        }
        Error::DependencyConflict {
            package: package.to_string(),
            requirements,
        }
    }

    /// Restart with a new pin, or fail if the pin is already known
    fn retry_or_conflict(
        &self,
        package: &str,
        constraint: &VersionConstraint,
        origin: &str,
        source: Option<&PackageMetadata>,
    ) -> Failure {
        let known = self
            .pins
            .get(package)
            .is_some_and(|pins| pins.iter().any(|p| &p.constraint == constraint));
        if known || *constraint == VersionConstraint::Any {
            return Failure::Error(self.conflict(package, Some(origin)));
        }
        Failure::Retry {
            package: package.to_string(),
            pin: Pin {
                constraint: constraint.clone(),
                origin: origin.to_string(),
                source: source.map(PackageMetadata::nevra),
            },
        }
    }

    fn choose(&self, state: &mut State<'a>, id: EntryId) {
        let universe: &'a Universe = self.universe;
        state.select(Pick {
            meta: self.meta(id),
            origin: Origin::Repo(universe.repo(id)),
        });
    }

    fn attempt(&self, state: &mut State<'a>) -> Step<()> {
        for &resolved in &self.floor {
            state.select(Pick {
                meta: &resolved.meta,
                origin: Origin::Floor(&resolved.spec),
            });
        }

        for req in self.set.includes() {
            self.cancel.check()?;
            self.include(state, req)?;
        }

        self.close(state)?;

        if self.set.install_weak_deps {
            self.weak(state)?;
        }

        self.check_conflicts(state)?;
        Ok(())
    }

    fn include(&self, state: &mut State<'a>, req: &Requirement) -> Step<()> {
        let origin = self.include_origin(req);

        if req.is_glob() {
            let mut matched = false;
            for name in self.universe.names() {
                if !req.matches_name(name) {
                    continue;
                }
                if state.chosen.contains_key(name) || self.is_installed_name(name) {
                    matched = true;
                    continue;
                }
                let candidates: Vec<EntryId> = self
                    .universe
                    .by_name(name)
                    .into_iter()
                    .filter(|&id| req.constraint.satisfies(&self.meta(id).evr()))
                    .collect();
                // Glob matches that are excluded or pinned away are dropped
                if let Some(&id) = candidates.iter().find(|&&id| {
                    let meta = self.meta(id);
                    !self.is_excluded(meta) && self.pins_allow(meta)
                }) {
                    self.choose(state, id);
                }
                matched |= !candidates.is_empty();
            }
            if !matched {
                return Err(Error::NoMatch {
                    requirement: req.to_string(),
                    required_by: self.set_label(),
                }
                .into());
            }
            return Ok(());
        }

        let cap = Capability::new(req.name.clone(), req.constraint.clone());
        self.satisfy(state, &cap, &origin, None)
    }

    /// Make sure something selected provides `cap`
    fn satisfy(
        &self,
        state: &mut State<'a>,
        cap: &Capability,
        origin: &str,
        source: Option<&'a PackageMetadata>,
    ) -> Step<()> {
        if state.provides(cap) || self.installed_index.providers(cap).next().is_some() {
            return Ok(());
        }
        let required_by = || source.map_or_else(|| self.set_label(), |m| m.name.clone());

        let mut providers = self.universe.providers(cap);
        if providers.is_empty() {
            if state.chosen.contains_key(&cap.name) || self.is_installed_name(&cap.name) {
                return Err(self.retry_or_conflict(&cap.name, &cap.constraint, origin, source));
            }
            return Err(Error::NoMatch {
                requirement: cap.to_string(),
                required_by: required_by(),
            }
            .into());
        }

        // Stable: keeps universe preference within each group
        providers.sort_by_key(|&id| {
            let meta = self.meta(id);
            (self.is_excluded(meta), meta.name != cap.name, meta.name.as_str())
        });

        // First provider whose name is taken by another build or pinned away
        let mut blocked: Option<&'a PackageMetadata> = None;
        let mut installed: Option<&'a PackageMetadata> = None;
        for &id in &providers {
            let meta = self.meta(id);
            if self.is_installed_name(&meta.name) {
                installed.get_or_insert(meta);
                continue;
            }
            if state.chosen.contains_key(&meta.name) || !self.pins_allow(meta) {
                blocked.get_or_insert(meta);
                continue;
            }
            self.choose(state, id);
            return Ok(());
        }

        if let Some(meta) = blocked {
            let constraint = if meta.name == cap.name {
                cap.constraint.clone()
            } else {
                VersionConstraint::Exact(meta.evr())
            };
            return Err(self.retry_or_conflict(&meta.name, &constraint, origin, source));
        }
        // Earlier sets fixed the build
        if let Some(meta) = installed {
            return Err(self.conflict(&meta.name, Some(origin)).into());
        }
        Err(Error::NoMatch {
            requirement: cap.to_string(),
            required_by: required_by(),
        }
        .into())
    }

    /// Close over hard requirements of everything queued
    fn close(&self, state: &mut State<'a>) -> Step<()> {
        while let Some(name) = state.queue.pop_front() {
            self.cancel.check()?;
            let Some(pick) = state.chosen.get(&name).copied() else {
                continue;
            };
            for req in &pick.meta.requires {
                if req.is_rpmlib() {
                    continue;
                }
                let origin = format!("{} requires {}", pick.meta.name, req);
                self.satisfy(state, req, &origin, Some(pick.meta))?;
            }
        }
        Ok(())
    }

    /// Add weak dependencies that resolve cleanly, skip the rest
    fn weak(&self, state: &mut State<'a>) -> Step<()> {
        let mut seen: HashSet<(String, String)> = HashSet::new();

        loop {
            let pending: Vec<(&'a str, &'a Capability)> = state
                .chosen
                .values()
                .flat_map(|p| {
                    let meta: &'a PackageMetadata = p.meta;
                    meta.recommends.iter().map(move |c| (meta.name.as_str(), c))
                })
                .filter(|(name, cap)| !seen.contains(&(name.to_string(), cap.to_string())))
                .collect();
            if pending.is_empty() {
                return Ok(());
            }

            for (name, cap) in pending {
                self.cancel.check()?;
                seen.insert((name.to_string(), cap.to_string()));
                if state.provides(cap) || self.installed_index.providers(cap).next().is_some() {
                    continue;
                }

                let candidate = self.universe.providers(cap).into_iter().find(|&id| {
                    let meta = self.meta(id);
                    !self.is_excluded(meta)
                        && !state.chosen.contains_key(&meta.name)
                        && !self.is_installed_name(&meta.name)
                        && self.pins_allow(meta)
                });
                let Some(id) = candidate else {
                    debug!("No installable provider for weak dependency {} of {}", cap, name);
                    continue;
                };

                let mark = state.mark();
                self.choose(state, id);
                let closed = self.close(state);
                if let Err(Failure::Error(Error::Cancelled)) = closed {
                    return Err(Error::Cancelled.into());
                }
                let accepted = closed.is_ok()
                    && state.added_since(mark).into_iter().all(|meta| {
                        !self.is_excluded(meta) && self.conflict_with(state, meta).is_none()
                    });
                if !accepted {
                    debug!("Skipping weak dependency {} of {}", cap, name);
                    state.rollback(mark);
                }
            }
        }
    }

    /// A `Conflicts:` of `pkg` against anything selected or installed
    fn conflict_of(&self, state: &State<'a>, pkg: &PackageMetadata) -> Option<Error> {
        pkg.conflicts.iter().find_map(|cap| {
            state
                .index
                .providers(cap)
                .chain(self.installed_index.providers(cap))
                .find(|other| other.name != pkg.name)
                .map(|other| conflict_error(pkg, cap, other))
        })
    }

    /// A conflict in either direction between `pkg` and the rest
    fn conflict_with(&self, state: &State<'a>, pkg: &PackageMetadata) -> Option<Error> {
        if let Some(err) = self.conflict_of(state, pkg) {
            return Some(err);
        }
        state
            .index
            .conflicting
            .iter()
            .chain(&self.installed_index.conflicting)
            .filter(|other| other.name != pkg.name)
            .find_map(|other| {
                other
                    .conflicts
                    .iter()
                    .find(|cap| pkg.provides_capability(cap))
                    .map(|cap| conflict_error(other, cap, pkg))
            })
    }

    fn check_conflicts(&self, state: &State<'a>) -> Step<()> {
        let all = state
            .chosen
            .values()
            .map(|p| p.meta)
            .chain(self.installed.iter().copied());
        for pkg in all {
            if let Some(err) = self.conflict_of(state, pkg) {
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Apply excludes and produce the ordered output
    fn finish(&self, state: &State<'a>) -> Result<Vec<Resolved>> {
        let (removed, kept): (Vec<Pick<'a>>, Vec<Pick<'a>>) = state
            .chosen
            .values()
            .copied()
            .partition(|p| self.is_excluded(p.meta));

        let mut kept_index = ProvideIndex::default();
        for pick in &kept {
            kept_index.insert(pick.meta);
        }
        let available = |cap: &Capability| {
            kept_index.providers(cap).next().is_some()
                || self.installed_index.providers(cap).next().is_some()
        };
        let removed_provider = |cap: &Capability| {
            removed
                .iter()
                .find(|p| p.meta.provides_capability(cap))
                .map(|p| p.meta.name.clone())
        };

        for pick in &kept {
            for req in pick.meta.requires.iter().filter(|r| !r.is_rpmlib()) {
                if available(req) {
                    continue;
                }
                if let Some(excluded) = removed_provider(req) {
                    return Err(Error::ExclusionConflict {
                        excluded,
                        required_by: pick.meta.name.clone(),
                    });
                }
            }
        }

        for req in self.set.includes().filter(|r| !r.is_glob()) {
            let cap = Capability::new(req.name.clone(), req.constraint.clone());
            if available(&cap) {
                continue;
            }
            if let Some(excluded) = removed_provider(&cap) {
                return Err(Error::ExclusionConflict {
                    excluded,
                    required_by: self.set_label(),
                });
            }
        }

        for pick in &removed {
            debug!(
                "Excluded {} from package set '{}'",
                pick.meta.nevra(),
                self.set.name
            );
        }

        let mut resolved: Vec<Resolved> = kept.iter().map(Pick::resolved).collect();
        resolved.sort_by(|a, b| a.spec.output_order(&b.spec));
        resolved.dedup_by(|b, a| a.spec.same_build(&b.spec));
        Ok(resolved)
    }
}
