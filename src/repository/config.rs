// src/repository/config.rs

//! Repository descriptors
//!
//! A [`RepoConfig`] is immutable once loaded and shared read-only by every
//! solver for its architecture.

use crate::arch::Arch;
use crate::hash;
use serde::{Deserialize, Serialize};

/// How a repository publishes its package metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MetadataFormat {
    /// `repodata/repomd.xml` with primary (and optional modules) data
    #[default]
    #[serde(rename = "rpm-md")]
    RpmMd,
    /// Single `metadata.json` index
    #[serde(rename = "json")]
    Json,
}

impl MetadataFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RpmMd => "rpm-md",
            Self::Json => "json",
        }
    }
}

/// Default repository priority, lower numbers win
pub const DEFAULT_PRIORITY: i32 = 99;

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub id: String,
    /// Base reference: `http(s)://` URL, `file://` URL or filesystem path
    pub baseurl: String,
    #[serde(default)]
    pub format: MetadataFormat,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Architectures this repository applies to; empty means all
    #[serde(default)]
    pub arches: Vec<Arch>,
    #[serde(default)]
    pub check_gpg: bool,
    #[serde(default)]
    pub check_repo_gpg: bool,
    #[serde(default)]
    pub gpg_keys: Vec<String>,
    #[serde(default)]
    pub ignore_ssl: bool,
    /// Modular packages from this repository bypass stream filtering
    #[serde(default)]
    pub module_hotfixes: bool,
    /// Non-essential: fetch failures are logged and the repository skipped
    #[serde(default)]
    pub skip_if_unavailable: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

impl RepoConfig {
    pub fn new(id: impl Into<String>, baseurl: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            baseurl: baseurl.into(),
            format: MetadataFormat::default(),
            enabled: true,
            arches: Vec::new(),
            check_gpg: false,
            check_repo_gpg: false,
            gpg_keys: Vec::new(),
            ignore_ssl: false,
            module_hotfixes: false,
            skip_if_unavailable: false,
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_format(mut self, format: MetadataFormat) -> Self {
        self.format = format;
        self
    }

    pub fn optional(mut self) -> Self {
        self.skip_if_unavailable = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_module_hotfixes(mut self) -> Self {
        self.module_hotfixes = true;
        self
    }

    pub fn applies_to(&self, arch: Arch) -> bool {
        self.enabled && (self.arches.is_empty() || self.arches.contains(&arch))
    }

    /// Identity of the metadata this repository serves
    ///
    /// GPG and SSL policy do not change the metadata, so they are left out.
    pub fn fingerprint(&self) -> String {
        hash::fingerprint([
            self.id.as_str(),
            self.baseurl.trim_end_matches('/'),
            self.format.name(),
        ])
    }

    /// Join a metadata-relative path onto the base reference
    pub fn resolve_location(&self, href: &str) -> String {
        if href.contains("://") {
            return href.to_string();
        }
        format!(
            "{}/{}",
            self.baseurl.trim_end_matches('/'),
            href.trim_start_matches('/')
        )
    }
}
