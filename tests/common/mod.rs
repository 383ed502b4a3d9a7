// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! Fixture repositories are written into temporary directories in both
//! supported metadata formats: a `metadata.json` index and rpm-md
//! `repodata/` with a gzip compressed primary.

#![allow(dead_code)]

use depsolve::repository::{MetadataFetcher, MetadataFormat, RepositoryData};
use depsolve::{Cancellation, RepoConfig, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// A fixture package
#[derive(Debug, Clone)]
pub struct Pkg {
    pub name: String,
    pub epoch: u64,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub provides: Vec<String>,
    pub requires: Vec<String>,
    pub recommends: Vec<String>,
    pub conflicts: Vec<String>,
    pub files: Vec<String>,
}

impl Pkg {
    /// `evr` is `[epoch:]version-release`
    pub fn new(name: &str, evr: &str, arch: &str) -> Self {
        let (epoch, rest) = match evr.split_once(':') {
            Some((e, rest)) => (e.parse().unwrap(), rest),
            None => (0, evr),
        };
        let (version, release) = rest.rsplit_once('-').unwrap();
        Self {
            name: name.to_string(),
            epoch,
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
            provides: Vec::new(),
            requires: Vec::new(),
            recommends: Vec::new(),
            conflicts: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn requires(mut self, cap: &str) -> Self {
        self.requires.push(cap.to_string());
        self
    }

    pub fn recommends(mut self, cap: &str) -> Self {
        self.recommends.push(cap.to_string());
        self
    }

    pub fn provides(mut self, cap: &str) -> Self {
        self.provides.push(cap.to_string());
        self
    }

    pub fn conflicts(mut self, cap: &str) -> Self {
        self.conflicts.push(cap.to_string());
        self
    }

    pub fn file(mut self, path: &str) -> Self {
        self.files.push(path.to_string());
        self
    }

    pub fn nevra(&self) -> String {
        format!(
            "{}-{}:{}-{}.{}",
            self.name, self.epoch, self.version, self.release, self.arch
        )
    }

    /// Deterministic per-build digest
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.nevra().as_bytes()))
    }

    pub fn location(&self) -> String {
        format!(
            "Packages/{}-{}-{}.{}.rpm",
            self.name, self.version, self.release, self.arch
        )
    }

    fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "epoch": self.epoch,
            "version": self.version,
            "release": self.release,
            "arch": self.arch,
            "checksum": format!("sha256:{}", self.digest()),
            "location": self.location(),
            "provides": self.provides,
            "requires": self.requires,
            "recommends": self.recommends,
            "conflicts": self.conflicts,
            "files": self.files,
        })
    }

    fn to_primary_xml(&self) -> String {
        let entries = |tag: &str, caps: &[String]| {
            if caps.is_empty() {
                return String::new();
            }
            let mut out = format!("<rpm:{}>", tag);
            for cap in caps {
                out.push_str(&entry_xml(cap));
            }
            out.push_str(&format!("</rpm:{}>", tag));
            out
        };
        let files: String = self
            .files
            .iter()
            .map(|f| format!("<file>{}</file>", f))
            .collect();

        format!(
            r#"<package type="rpm">
  <name>{name}</name>
  <arch>{arch}</arch>
  <version epoch="{epoch}" ver="{ver}" rel="{rel}"/>
  <checksum type="sha256" pkgid="YES">{digest}</checksum>
  <location href="{location}"/>
  <format>{provides}{requires}{recommends}{conflicts}{files}</format>
</package>
"#,
            name = self.name,
            arch = self.arch,
            epoch = self.epoch,
            ver = self.version,
            rel = self.release,
            digest = self.digest(),
            location = self.location(),
            provides = entries("provides", &self.provides),
            requires = entries("requires", &self.requires),
            recommends = entries("recommends", &self.recommends),
            conflicts = entries("conflicts", &self.conflicts),
            files = files,
        )
    }
}

/// `name [op epoch:ver-rel]` → `<rpm:entry .../>`
fn entry_xml(cap: &str) -> String {
    let parts: Vec<&str> = cap.split_whitespace().collect();
    if parts.len() != 3 {
        return format!(r#"<rpm:entry name="{}"/>"#, cap);
    }
    let flags = match parts[1] {
        "=" => "EQ",
        "<" => "LT",
        "<=" => "LE",
        ">" => "GT",
        ">=" => "GE",
        other => panic!("unknown operator {}", other),
    };
    let (epoch, rest) = parts[2].split_once(':').unwrap_or(("0", parts[2]));
    let (ver, rel) = match rest.rsplit_once('-') {
        Some((v, r)) => (v, Some(r)),
        None => (rest, None),
    };
    match rel {
        Some(rel) => format!(
            r#"<rpm:entry name="{}" flags="{}" epoch="{}" ver="{}" rel="{}"/>"#,
            parts[0], flags, epoch, ver, rel
        ),
        None => format!(
            r#"<rpm:entry name="{}" flags="{}" epoch="{}" ver="{}"/>"#,
            parts[0], flags, epoch, ver
        ),
    }
}

/// Write a `metadata.json` repository
pub fn write_json_repo(dir: &Path, packages: &[Pkg]) {
    fs::create_dir_all(dir).unwrap();
    let index = json!({
        "name": dir.file_name().map(|n| n.to_string_lossy().into_owned()),
        "packages": packages.iter().map(Pkg::to_json).collect::<Vec<_>>(),
    });
    fs::write(dir.join("metadata.json"), serde_json::to_vec_pretty(&index).unwrap()).unwrap();
}

/// Write an rpm-md repository with a gzip compressed primary
pub fn write_rpm_md_repo(dir: &Path, packages: &[Pkg]) {
    write_rpm_md(dir, packages, None);
}

/// Write an rpm-md repository that also carries a `modules.yaml` document
pub fn write_rpm_md_repo_with_modules(dir: &Path, packages: &[Pkg], modules: &str) {
    write_rpm_md(dir, packages, Some(modules));
}

/// A `modulemd` document for `name:stream` built for `platform`
pub fn modulemd(name: &str, stream: &str, platform: &str, artifacts: &[&Pkg]) -> String {
    let rpms: String = artifacts
        .iter()
        .map(|p| format!("    - {}\n", p.nevra()))
        .collect();
    format!(
        "---\ndocument: modulemd\nversion: 2\ndata:\n  name: {}\n  stream: \"{}\"\n  \
         dependencies:\n  - requires:\n      platform: [{}]\n  artifacts:\n    rpms:\n{}",
        name, stream, platform, rpms
    )
}

/// A `modulemd-defaults` document naming the default stream of `name`
pub fn modulemd_defaults(name: &str, stream: &str) -> String {
    format!(
        "---\ndocument: modulemd-defaults\nversion: 1\ndata:\n  module: {}\n  stream: \"{}\"\n",
        name, stream
    )
}

fn write_rpm_md(dir: &Path, packages: &[Pkg], modules: Option<&str>) {
    let repodata = dir.join("repodata");
    fs::create_dir_all(&repodata).unwrap();

    let body: String = packages.iter().map(Pkg::to_primary_xml).collect();
    let primary = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="{}">
{}</metadata>
"#,
        packages.len(),
        body
    );

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(primary.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();
    let checksum = hex::encode(Sha256::digest(&compressed));
    let primary_name = format!("{}-primary.xml.gz", &checksum[..16]);
    fs::write(repodata.join(&primary_name), &compressed).unwrap();

    let modules_entry = match modules {
        Some(yaml) => {
            fs::write(repodata.join("modules.yaml"), yaml).unwrap();
            format!(
                r#"  <data type="modules">
    <checksum type="sha256">{}</checksum>
    <location href="repodata/modules.yaml"/>
  </data>
"#,
                hex::encode(Sha256::digest(yaml.as_bytes()))
            )
        }
        None => String::new(),
    };

    let repomd = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1700000000</revision>
  <data type="primary">
    <checksum type="sha256">{}</checksum>
    <location href="repodata/{}"/>
    <size>{}</size>
  </data>
{}</repomd>
"#,
        checksum,
        primary_name,
        compressed.len(),
        modules_entry
    );
    fs::write(repodata.join("repomd.xml"), repomd).unwrap();
}

pub fn json_repo(id: &str, dir: &Path) -> RepoConfig {
    RepoConfig::new(id, dir.display().to_string()).with_format(MetadataFormat::Json)
}

pub fn rpm_md_repo(id: &str, dir: &Path) -> RepoConfig {
    RepoConfig::new(id, dir.display().to_string())
}

/// BaseOS and AppStream style repositories carrying bind and its closure
///
/// Returns the temp dir holding the cache (`cache/`) and both repositories.
pub fn bind_fixture() -> (TempDir, Vec<RepoConfig>) {
    let root = tempfile::tempdir().unwrap();

    let baseos = vec![
        Pkg::new("bash", "5.1.8-6.el9", "x86_64")
            .requires("glibc")
            .provides("/bin/sh")
            .file("/bin/bash")
            .file("/bin/sh"),
        Pkg::new("glibc", "2.34-83.el9", "x86_64").requires("tzdata"),
        Pkg::new("tzdata", "2024a-1.el9", "noarch"),
        Pkg::new("bind-license", "32:9.16.23-14.el9", "noarch"),
        Pkg::new("bind-libs", "32:9.16.23-14.el9", "x86_64")
            .requires("bind-license = 32:9.16.23-14.el9")
            .requires("glibc")
            .provides("libisc-9.16.23-RH.so()(64bit)"),
        Pkg::new("bind-utils", "32:9.16.23-14.el9", "x86_64")
            .requires("bind-libs = 32:9.16.23-14.el9"),
        Pkg::new("bind-libs", "32:9.16.23-14.el9", "aarch64"),
    ];
    let appstream = vec![
        Pkg::new("bind", "32:9.16.23-14.el9", "x86_64")
            .requires("bind-libs = 32:9.16.23-14.el9")
            .requires("libisc-9.16.23-RH.so()(64bit)")
            .requires("/bin/sh")
            .recommends("bind-utils"),
        Pkg::new("bind", "32:9.16.23-14.el9", "src"),
    ];

    write_rpm_md_repo(&root.path().join("baseos"), &baseos);
    write_json_repo(&root.path().join("appstream"), &appstream);

    let repos = vec![
        rpm_md_repo("baseos", &root.path().join("baseos")),
        json_repo("appstream", &root.path().join("appstream")),
    ];
    (root, repos)
}

/// Fetcher wrapper counting calls to the wrapped fetcher
pub struct CountingFetcher<F> {
    pub inner: F,
    pub calls: AtomicUsize,
}

impl<F> CountingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F: MetadataFetcher> MetadataFetcher for CountingFetcher<F> {
    fn fetch(&self, repo: &RepoConfig, cancel: &Cancellation) -> Result<RepositoryData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(repo, cancel)
    }
}
