// src/repository/mod.rs

//! Repository configuration, metadata retrieval and caching
//!
//! This module provides functionality for:
//! - Describing repositories and loading per-distribution definitions
//! - Parsing rpm-md (`repodata/`) and JSON metadata indexes
//! - Module stream metadata
//! - A shared, process- and thread-safe metadata cache

mod cache;
mod client;
mod config;
mod metadata;
pub mod modules;
pub mod registry;
pub mod repomd;

pub use cache::{CacheIndex, CacheKey, CacheStats, MetadataCache};
pub use client::{JSON_INDEX, MetadataFetcher, RepositoryClient};
pub use config::{DEFAULT_PRIORITY, MetadataFormat, RepoConfig};
pub use metadata::{Capability, ModuleTag, PackageMetadata, RepositoryData};
pub use registry::{RepositoryMap, load_repositories, load_repository_file};
