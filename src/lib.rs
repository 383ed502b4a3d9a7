// src/lib.rs

//! RPM package-set dependency resolution
//!
//! Turns declarative package sets (names, globs, version constraints,
//! excludes) into fully pinned package lists against RPM repositories,
//! for every target architecture of an image build.
//!
//! # Architecture
//!
//! - Solver contexts: one immutable [`Solver`] per (distribution, architecture),
//!   derived from a shared [`BaseSolver`]
//! - Metadata cache: repository metadata fetched once per cache key and shared
//!   across solvers, threads and processes
//! - Chains: package sets resolved in order, later sets building on earlier results
//! - Fan-out: architectures resolved in parallel with per-architecture failures

pub mod arch;
pub mod cancel;
pub mod compression;
pub mod config;
pub mod depsolve;
mod error;
pub mod hash;
pub mod package_spec;
pub mod packageset;
pub mod repository;
pub mod version;

pub use arch::Arch;
pub use cancel::Cancellation;
pub use depsolve::{
    ArchRequest, BaseSolver, BatchMode, BatchResult, ChainOutcome, ChainResolution,
    FanoutOptions, MultiArchResult, SetResult, Solver, Target,
};
pub use error::{ArchErrors, Error, ErrorKind, Result};
pub use hash::{Checksum, ChecksumType};
pub use package_spec::PackageSpec;
pub use packageset::{PackageSet, PackageSetChain, PriorMode, PriorSelection, Requirement};
pub use repository::{MetadataCache, MetadataFetcher, RepoConfig, RepositoryClient};
pub use version::{RpmVersion, VersionConstraint};
