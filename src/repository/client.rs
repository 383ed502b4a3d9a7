// src/repository/client.rs

//! Repository metadata retrieval
//!
//! [`RepositoryClient`] reads metadata over HTTP(S), from `file://` URLs or
//! from plain paths. It makes exactly one attempt per file: retry policy
//! belongs to the caller.

use crate::cancel::Cancellation;
use crate::compression::decompress_metadata;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::config::{MetadataFormat, RepoConfig};
use super::metadata::{JsonIndex, RepositoryData};
use super::modules::ModuleIndex;
use super::repomd::{REPOMD_PATH, parse_primary, parse_repomd};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming reads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// File name of the JSON index format
pub const JSON_INDEX: &str = "metadata.json";

/// Source of repository metadata
///
/// The solver only talks to this trait, so tests and embedders can serve
/// metadata from memory.
pub trait MetadataFetcher: Send + Sync {
    /// Fetch and parse all metadata of `repo`
    ///
    /// Failures are reported as [`Error::RepositoryFetch`] naming the
    /// repository, or [`Error::Cancelled`].
    fn fetch(&self, repo: &RepoConfig, cancel: &Cancellation) -> Result<RepositoryData>;
}

/// Where a metadata file lives
enum Source {
    Remote(String),
    Local(PathBuf),
}

fn source_of(location: &str) -> Result<Source> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Ok(Source::Remote(location.to_string()));
    }
    if location.starts_with("file://") {
        let url = Url::parse(location)
            .map_err(|e| Error::Config(format!("invalid URL '{}': {}", location, e)))?;
        let path = url
            .to_file_path()
            .map_err(|_| Error::Config(format!("'{}' is not a local file URL", location)))?;
        return Ok(Source::Local(path));
    }
    if location.contains("://") {
        return Err(Error::Config(format!("unsupported URL scheme in '{}'", location)));
    }
    Ok(Source::Local(PathBuf::from(location)))
}

/// Read everything from `reader`, checking `cancel` between chunks
fn read_cancellable(mut reader: impl Read, cancel: &Cancellation) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    loop {
        cancel.check()?;
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);
    }
    Ok(data)
}

/// HTTP and filesystem metadata reader
pub struct RepositoryClient {
    client: Client,
    insecure: Client,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let build = |accept_invalid: bool| {
            Client::builder()
                .timeout(HTTP_TIMEOUT)
                .danger_accept_invalid_certs(accept_invalid)
                .build()
                .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))
        };

        Ok(Self {
            client: build(false)?,
            insecure: build(true)?,
        })
    }

    /// Read one file relative to the repository base
    fn read(&self, repo: &RepoConfig, href: &str, cancel: &Cancellation) -> Result<Vec<u8>> {
        cancel.check()?;
        let location = repo.resolve_location(href);
        debug!("Reading {}", location);

        match source_of(&location)? {
            Source::Local(path) => {
                let file = File::open(&path).map_err(|e| {
                    Error::Parse(format!("Failed to open {}: {}", path.display(), e))
                })?;
                read_cancellable(file, cancel)
            }
            Source::Remote(url) => {
                let client = if repo.ignore_ssl {
                    &self.insecure
                } else {
                    &self.client
                };
                let response = client
                    .get(&url)
                    .send()
                    .map_err(|e| Error::Parse(format!("Failed to fetch {}: {}", url, e)))?;

                if !response.status().is_success() {
                    return Err(Error::Parse(format!(
                        "HTTP {} from {}",
                        response.status(),
                        url
                    )));
                }
                read_cancellable(response, cancel)
            }
        }
    }

    fn fetch_json(&self, repo: &RepoConfig, cancel: &Cancellation) -> Result<RepositoryData> {
        let bytes = self.read(repo, JSON_INDEX, cancel)?;
        let index: JsonIndex = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Parse(format!("Failed to parse {}: {}", JSON_INDEX, e)))?;
        Ok(RepositoryData::new(repo.id.clone(), index.packages))
    }

    fn fetch_rpm_md(&self, repo: &RepoConfig, cancel: &Cancellation) -> Result<RepositoryData> {
        let repomd = parse_repomd(&self.read(repo, REPOMD_PATH, cancel)?)?;

        let primary = repomd.primary()?;
        let raw = self.read(repo, &primary.location, cancel)?;
        if let Some(checksum) = &primary.checksum
            && !checksum.verify(&raw)?
        {
            debug!("Cannot verify {} checksum of {}", checksum.algorithm, primary.location);
        }
        let mut packages = parse_primary(&decompress_metadata(&primary.location, &raw)?)?;

        if let Some(modules) = repomd.modules() {
            let raw = self.read(repo, &modules.location, cancel)?;
            let index = ModuleIndex::parse(&decompress_metadata(&modules.location, &raw)?)?;
            index.apply(&mut packages);
        }

        Ok(RepositoryData::new(repo.id.clone(), packages))
    }
}

impl MetadataFetcher for RepositoryClient {
    fn fetch(&self, repo: &RepoConfig, cancel: &Cancellation) -> Result<RepositoryData> {
        info!("Fetching {} metadata for repository {}", repo.format.name(), repo.id);

        let result = match repo.format {
            MetadataFormat::RpmMd => self.fetch_rpm_md(repo, cancel),
            MetadataFormat::Json => self.fetch_json(repo, cancel),
        };

        match result {
            Ok(data) => {
                info!("Repository {} has {} packages", repo.id, data.packages.len());
                Ok(data)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => Err(Error::RepositoryFetch {
                repo_id: repo.id.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
