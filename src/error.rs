// src/error.rs

//! Error types for dependency resolution
//!
//! Every failure carries enough context (repository id, package names,
//! chain and set names) to localize the fault without re-running.

use std::fmt;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the resolution core
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid solver or package set configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Repository metadata could not be retrieved
    #[error("Failed to fetch metadata for repository '{repo_id}': {reason}")]
    RepositoryFetch { repo_id: String, reason: String },

    /// Nothing in the candidate universe satisfies a requirement
    #[error("No package provides '{requirement}' (required by {required_by})")]
    NoMatch {
        requirement: String,
        required_by: String,
    },

    /// Contradictory requirements on the same package
    #[error("Conflicting requirements for '{package}': {}", .requirements.join("; "))]
    DependencyConflict {
        package: String,
        requirements: Vec<String>,
    },

    /// An excluded package is a hard dependency of an included one
    #[error("Package '{excluded}' is excluded but required by {required_by}")]
    ExclusionConflict {
        excluded: String,
        required_by: String,
    },

    /// Caller cancelled the operation or its deadline passed
    #[error("Operation cancelled")]
    Cancelled,

    /// A package set inside a chain failed
    #[error("Package set '{set}' of chain '{chain}' failed: {source}")]
    Chain {
        chain: String,
        set: String,
        #[source]
        source: Box<Error>,
    },

    /// Malformed metadata or definition file
    #[error("Parse error: {0}")]
    Parse(String),

    /// Metadata cache bookkeeping failure
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error taxonomy callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    RepositoryFetch,
    DependencyConflict,
    ExclusionConflict,
    Cancelled,
    Io,
}

impl Error {
    /// Classify this error
    ///
    /// Chain errors report the kind of the set failure they wrap.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::RepositoryFetch { .. } => ErrorKind::RepositoryFetch,
            Error::NoMatch { .. } | Error::DependencyConflict { .. } => {
                ErrorKind::DependencyConflict
            }
            Error::ExclusionConflict { .. } => ErrorKind::ExclusionConflict,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Chain { source, .. } => source.kind(),
            Error::Parse(_) | Error::Cache(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Tag a set failure with the chain and set it came from
    pub(crate) fn in_chain(self, chain: &str, set: &str) -> Self {
        Error::Chain {
            chain: chain.to_string(),
            set: set.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping chain tags
    pub fn root(&self) -> &Error {
        match self {
            Error::Chain { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Per-architecture failures collected by the fan-out driver
#[derive(Debug, Default)]
pub struct ArchErrors {
    errors: Vec<(String, Error)>,
}

impl ArchErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, arch: impl Into<String>, error: Error) {
        self.errors.push((arch.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, arch: &str) -> Option<&Error> {
        self.errors
            .iter()
            .find(|(a, _)| a == arch)
            .map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.errors.iter().map(|(a, e)| (a.as_str(), e))
    }

    pub(crate) fn sort(&mut self) {
        self.errors.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

impl fmt::Display for ArchErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} architecture(s) failed:", self.errors.len())?;
        for (arch, error) in &self.errors {
            writeln!(f, "  - {}: {}", arch, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ArchErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_kind_delegates_to_source() {
        let err = Error::ExclusionConflict {
            excluded: "bind-libs".to_string(),
            required_by: "bind-32:9.16.23-1.el9.x86_64".to_string(),
        }
        .in_chain("os", "blueprint");

        assert_eq!(err.kind(), ErrorKind::ExclusionConflict);
        assert!(matches!(err.root(), Error::ExclusionConflict { .. }));
        assert!(err.to_string().contains("chain 'os'"));
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(Error::Cancelled.is_cancelled());
        assert_ne!(
            Error::Cancelled.kind(),
            Error::NoMatch {
                requirement: "x".to_string(),
                required_by: "y".to_string()
            }
            .kind()
        );
    }

    #[test]
    fn test_arch_errors_display() {
        let mut errors = ArchErrors::new();
        errors.push("x86_64", Error::Config("bad".to_string()));
        errors.push("aarch64", Error::Cancelled);
        errors.sort();

        let text = errors.to_string();
        assert!(text.starts_with("2 architecture(s) failed"));
        assert_eq!(errors.iter().next().map(|(a, _)| a), Some("aarch64"));
        assert!(errors.get("x86_64").is_some());
    }
}
