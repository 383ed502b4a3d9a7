// src/arch.rs

//! Target architectures and package architecture compatibility

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Architecture-independent packages
pub const NOARCH: &str = "noarch";

/// Source packages, never installable
pub const SRC: &str = "src";

/// An image build target architecture
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum Arch {
    #[strum(serialize = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
    #[strum(serialize = "aarch64")]
    #[serde(rename = "aarch64")]
    Aarch64,
    #[strum(serialize = "ppc64le")]
    #[serde(rename = "ppc64le")]
    Ppc64le,
    #[strum(serialize = "s390x")]
    #[serde(rename = "s390x")]
    S390x,
}

impl Arch {
    /// Parse an architecture name, rejecting empty and unknown values
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("architecture must not be empty".to_string()));
        }
        Arch::from_str(s).map_err(|_| Error::Config(format!("unknown architecture '{}'", s)))
    }

    /// Package architectures installable on this target, in preference order
    pub fn compatible(&self) -> [&'static str; 2] {
        [self.as_str(), NOARCH]
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Check if a package built for `pkg_arch` installs on this target
    pub fn accepts(&self, pkg_arch: &str) -> bool {
        pkg_arch != SRC && self.compatible().contains(&pkg_arch)
    }

    /// Rank used to prefer native packages over noarch ones
    pub(crate) fn preference(&self, pkg_arch: &str) -> usize {
        self.compatible()
            .iter()
            .position(|a| *a == pkg_arch)
            .unwrap_or(usize::MAX)
    }
}
