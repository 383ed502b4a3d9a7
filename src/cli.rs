// src/cli.rs
//! CLI definitions for the depsolve driver
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "depsolve")]
#[command(author = "Depsolve Contributors")]
#[command(version)]
#[command(
    about = "Resolve RPM package sets for multi-architecture image builds",
    long_about = None
)]
pub struct Cli {
    /// Driver configuration file (TOML)
    #[arg(short, long, global = true, default_value = "/etc/depsolve/depsolve.toml")]
    pub config: PathBuf,

    /// Override the metadata cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Override the distribution name
    #[arg(long, global = true)]
    pub distro: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the package set chains of a request file
    Resolve {
        /// Request file (JSON): architectures, repositories and chains
        request: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker threads (0 = one per architecture)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Stop outstanding architectures after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Report failed chains next to successful ones
        #[arg(long)]
        best_effort: bool,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List the repositories defined for the distribution
    Repos {
        /// Only show this architecture
        #[arg(short, long)]
        arch: Option<String>,
    },

    /// Show cached repository metadata
    CacheList,

    /// Remove cached repository metadata
    CleanCache {
        /// Only remove entries fetched more than this many days ago
        #[arg(long)]
        older_than: Option<u64>,
    },
}
