// src/depsolve/mod.rs

//! Package set resolution
//!
//! A [`BaseSolver`] owns the shared metadata cache and derives one
//! [`Solver`] per (distribution, architecture). Solvers resolve single
//! package sets, chains of sets and batches of chains; the fan-out driver
//! runs several architectures side by side.
//!
//! # Example
//!
//! ```ignore
//! use depsolve::{BaseSolver, PackageSet, RepoConfig};
//!
//! let base = BaseSolver::new("/var/cache/depsolve")?;
//! let solver = base
//!     .derive("platform:el9", "9", "x86_64", "centos-9")?
//!     .with_repositories(vec![RepoConfig::new("baseos", "https://mirror/9/BaseOS/$basearch/os")]);
//!
//! let set = PackageSet::new("os").with_packages(["bind", "-tzdata"])?;
//! for spec in solver.depsolve(&set)? {
//!     println!("{}", spec);
//! }
//! ```

mod chain;
mod context;
mod engine;
pub mod filter;
mod fanout;
mod universe;

pub use chain::{BatchMode, BatchResult, ChainOutcome, ChainResolution, SetResult};
pub use context::{BaseSolver, Solver};
pub use fanout::{ArchRequest, FanoutOptions, MultiArchResult, Target};
