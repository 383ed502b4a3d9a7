// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: driver configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .default_value("/etc/depsolve/depsolve.toml")
        .help("Driver configuration file (TOML)")
}

fn build_cli() -> Command {
    Command::new("depsolve")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Depsolve Contributors")
        .about("Resolve RPM package sets for multi-architecture image builds")
        .subcommand_required(true)
        .arg(config_arg())
        .arg(
            Arg::new("cache_dir")
                .long("cache-dir")
                .value_name("PATH")
                .help("Override the metadata cache directory"),
        )
        .arg(Arg::new("distro").long("distro").help("Override the distribution name"))
        .subcommand(
            Command::new("resolve")
                .about("Resolve the package set chains of a request file")
                .arg(Arg::new("request").required(true).help("Request file (JSON)"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Write the result here instead of stdout"),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .help("Worker threads (0 = one per architecture)"),
                )
                .arg(
                    Arg::new("fail_fast")
                        .long("fail-fast")
                        .action(clap::ArgAction::SetTrue)
                        .help("Stop outstanding architectures after the first failure"),
                )
                .arg(
                    Arg::new("best_effort")
                        .long("best-effort")
                        .action(clap::ArgAction::SetTrue)
                        .help("Report failed chains next to successful ones"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help("Give up after this many seconds"),
                ),
        )
        .subcommand(
            Command::new("repos")
                .about("List the repositories defined for the distribution")
                .arg(Arg::new("arch").short('a').long("arch").help("Only show this architecture")),
        )
        .subcommand(Command::new("cache-list").about("Show cached repository metadata"))
        .subcommand(
            Command::new("clean-cache")
                .about("Remove cached repository metadata")
                .arg(
                    Arg::new("older_than")
                        .long("older-than")
                        .help("Only remove entries fetched more than this many days ago"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("depsolve.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
