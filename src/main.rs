// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::ResolveOverrides;

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(&cli.config, cli.cache_dir, cli.distro)?;

    match cli.command {
        Commands::Resolve {
            request,
            output,
            workers,
            fail_fast,
            best_effort,
            timeout,
        } => commands::cmd_resolve(
            config,
            &request,
            output.as_deref(),
            ResolveOverrides {
                workers,
                fail_fast,
                best_effort,
                timeout,
            },
        ),
        Commands::Repos { arch } => commands::cmd_repos(&config, arch.as_deref()),
        Commands::CacheList => commands::cmd_cache_list(&config),
        Commands::CleanCache { older_than } => commands::cmd_clean_cache(&config, older_than),
    }
}
