// src/version/mod.rs

//! Version handling and constraint satisfaction for package dependencies
//!
//! This module provides version parsing and comparison for RPM-style versions,
//! including support for epoch:version-release format, the `rpmvercmp`
//! segment ordering, and the comparison flags used in repository metadata.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A parsed RPM version with epoch, version, and release components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    pub fn new(epoch: u64, version: impl Into<String>, release: Option<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release,
        }
    }

    /// Parse an RPM version string
    ///
    /// Format: [epoch:]version[-release]
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1.2.3-4.el8" → epoch=0, version="1.2.3", release=Some("4.el8")
    /// - "1:2.3.4-5.el8" → epoch=1, version="2.3.4", release=Some("5.el8")
    pub fn parse(s: &str) -> Result<Self> {
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, r)) => (e, r),
            None => ("0", s),
        };

        let epoch = if epoch_str.is_empty() {
            0 // Empty epoch (e.g., ":1.0.0") defaults to 0
        } else {
            epoch_str.parse::<u64>().map_err(|e| {
                Error::Parse(format!("Invalid epoch in version '{}': {}", s, e))
            })?
        };

        // The release is everything after the last dash; versions never contain one
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(Error::Parse(format!("Empty version component in '{}'", s)));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Compare two RPM versions by epoch, version and release
    ///
    /// A missing release sorts before any present release.
    pub fn compare(&self, other: &RpmVersion) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| {
                rpmvercmp(
                    self.release.as_deref().unwrap_or(""),
                    other.release.as_deref().unwrap_or(""),
                )
            })
    }

    /// Compare for constraint matching
    ///
    /// When either side has no release, only epoch and version take part,
    /// so `>= 1.0` matches `1.0-3.el9`.
    pub fn compare_loose(&self, other: &RpmVersion) -> Ordering {
        let base = self
            .epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version));

        match (&self.release, &other.release) {
            (Some(a), Some(b)) => base.then_with(|| rpmvercmp(a, b)),
            _ => base,
        }
    }

    /// Format as `epoch:version-release`, always including the epoch
    pub fn to_evr_string(&self) -> String {
        match &self.release {
            Some(release) => format!("{}:{}-{}", self.epoch, self.version, release),
            None => format!("{}:{}", self.epoch, self.version),
        }
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Raw strings break rpmvercmp ties ("1.0" vs "1.00") so Ord agrees with Eq
        self.compare(other)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.release.cmp(&other.release))
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version or release strings the way rpm does
///
/// Strings are split into alternating numeric and alphabetic segments.
/// Numeric segments compare numerically and beat alphabetic ones; `~`
/// sorts before everything (pre-releases) and `^` after the base version
/// but before any further segment (post-release snapshots).
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    let is_sep = |c: u8| !c.is_ascii_alphanumeric() && c != b'~' && c != b'^';

    loop {
        while i < one.len() && is_sep(one[i]) {
            i += 1;
        }
        while j < two.len() && is_sep(two[j]) {
            j += 1;
        }

        let c1 = one.get(i).copied();
        let c2 = two.get(j).copied();

        if c1 == Some(b'~') || c2 == Some(b'~') {
            if c1 != Some(b'~') {
                return Ordering::Greater;
            }
            if c2 != Some(b'~') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if c1 == Some(b'^') || c2 == Some(b'^') {
            if c1.is_none() {
                return Ordering::Less;
            }
            if c2.is_none() {
                return Ordering::Greater;
            }
            if c1 != Some(b'^') {
                return Ordering::Greater;
            }
            if c2 != Some(b'^') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        let numeric = one[i].is_ascii_digit();
        let take = |s: &[u8], start: usize| -> usize {
            let mut end = start;
            while end < s.len()
                && (if numeric {
                    s[end].is_ascii_digit()
                } else {
                    s[end].is_ascii_alphabetic()
                })
            {
                end += 1;
            }
            end
        };

        let end1 = take(one, i);
        let end2 = take(two, j);
        let seg1 = &one[i..end1];
        let seg2 = &two[j..end2];

        if seg2.is_empty() {
            // Segments of different types: numeric is newer
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            let s1 = strip_leading_zeros(seg1);
            let s2 = strip_leading_zeros(seg2);
            s1.len().cmp(&s2.len()).then_with(|| s1.cmp(s2))
        } else {
            seg1.cmp(seg2)
        };

        if ord != Ordering::Equal {
            return ord;
        }

        i = end1;
        j = end2;
    }

    match (i >= one.len(), j >= two.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[start..]
}

/// Version constraint operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version match
    Exact(RpmVersion),
    /// Greater than
    GreaterThan(RpmVersion),
    /// Greater than or equal
    GreaterOrEqual(RpmVersion),
    /// Less than
    LessThan(RpmVersion),
    /// Less than or equal
    LessOrEqual(RpmVersion),
}

const FLAG_LT: u8 = 1;
const FLAG_GT: u8 = 2;
const FLAG_EQ: u8 = 4;

impl VersionConstraint {
    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">= 1.2.3" → GreaterOrEqual(1.2.3)
    /// - "< 2.0.0" → LessThan(2.0.0)
    /// - "= 1.5.0" or "== 1.5.0" → Exact(1.5.0)
    /// - "> 1.0" → GreaterThan(1.0)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::Any);
        }

        if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionConstraint::GreaterOrEqual(RpmVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionConstraint::LessOrEqual(RpmVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix("==") {
            Ok(VersionConstraint::Exact(RpmVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionConstraint::GreaterThan(RpmVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionConstraint::LessThan(RpmVersion::parse(rest.trim())?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionConstraint::Exact(RpmVersion::parse(rest.trim())?))
        } else {
            // No operator means exact match
            Ok(VersionConstraint::Exact(RpmVersion::parse(s)?))
        }
    }

    /// Build a constraint from repository metadata flags (`EQ`, `GE`, ...)
    pub fn from_flags(flags: Option<&str>, version: Option<RpmVersion>) -> Result<Self> {
        let (flags, version) = match (flags, version) {
            (None, _) | (_, None) => return Ok(VersionConstraint::Any),
            (Some(f), Some(v)) => (f, v),
        };

        match flags {
            "EQ" => Ok(VersionConstraint::Exact(version)),
            "LT" => Ok(VersionConstraint::LessThan(version)),
            "LE" => Ok(VersionConstraint::LessOrEqual(version)),
            "GT" => Ok(VersionConstraint::GreaterThan(version)),
            "GE" => Ok(VersionConstraint::GreaterOrEqual(version)),
            other => Err(Error::Parse(format!("Unknown comparison flag '{}'", other))),
        }
    }

    /// The version this constraint compares against, if any
    pub fn version(&self) -> Option<&RpmVersion> {
        match self {
            VersionConstraint::Any => None,
            VersionConstraint::Exact(v)
            | VersionConstraint::GreaterThan(v)
            | VersionConstraint::GreaterOrEqual(v)
            | VersionConstraint::LessThan(v)
            | VersionConstraint::LessOrEqual(v) => Some(v),
        }
    }

    fn flags(&self) -> u8 {
        match self {
            VersionConstraint::Any => 0,
            VersionConstraint::Exact(_) => FLAG_EQ,
            VersionConstraint::GreaterThan(_) => FLAG_GT,
            VersionConstraint::GreaterOrEqual(_) => FLAG_GT | FLAG_EQ,
            VersionConstraint::LessThan(_) => FLAG_LT,
            VersionConstraint::LessOrEqual(_) => FLAG_LT | FLAG_EQ,
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &RpmVersion) -> bool {
        let Some(target) = self.version() else {
            return true;
        };

        let ord = version.compare_loose(target);
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(_) => ord == Ordering::Equal,
            VersionConstraint::GreaterThan(_) => ord == Ordering::Greater,
            VersionConstraint::GreaterOrEqual(_) => ord != Ordering::Less,
            VersionConstraint::LessThan(_) => ord == Ordering::Less,
            VersionConstraint::LessOrEqual(_) => ord != Ordering::Greater,
        }
    }

    /// Check whether two ranges share at least one version
    ///
    /// Used to match a versioned requirement against a versioned provide.
    /// An unversioned side overlaps everything.
    pub fn overlaps(&self, other: &VersionConstraint) -> bool {
        let (Some(a), Some(b)) = (self.version(), other.version()) else {
            return true;
        };

        let (fa, fb) = (self.flags(), other.flags());
        match a.compare_loose(b) {
            Ordering::Less => fa & FLAG_GT != 0 || fb & FLAG_LT != 0,
            Ordering::Greater => fa & FLAG_LT != 0 || fb & FLAG_GT != 0,
            Ordering::Equal => {
                (fa & FLAG_EQ != 0 && fb & FLAG_EQ != 0)
                    || (fa & FLAG_LT != 0 && fb & FLAG_LT != 0)
                    || (fa & FLAG_GT != 0 && fb & FLAG_GT != 0)
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "= {}", v),
            VersionConstraint::GreaterThan(v) => write!(f, "> {}", v),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">= {}", v),
            VersionConstraint::LessThan(v) => write!(f, "< {}", v),
            VersionConstraint::LessOrEqual(v) => write!(f, "<= {}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> RpmVersion {
        RpmVersion::parse(s).unwrap()
    }

    #[test]
    fn test_rpm_version_parse_simple() {
        let v = RpmVersion::parse("1.2.3").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.release, None);
    }

    #[test]
    fn test_rpm_version_parse_full() {
        let v = RpmVersion::parse("1:2.3.4-5.el8").unwrap();
        assert_eq!(v.epoch, 1);
        assert_eq!(v.version, "2.3.4");
        assert_eq!(v.release, Some("5.el8".to_string()));
    }

    #[test]
    fn test_rpm_version_parse_empty_epoch() {
        let v = RpmVersion::parse(":1.02.208-2.fc43").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.02.208");
        assert_eq!(v.release, Some("2.fc43".to_string()));
    }

    #[test]
    fn test_rpm_version_parse_rejects_bad_epoch() {
        assert!(RpmVersion::parse("x:1.0").is_err());
        assert!(RpmVersion::parse("1:").is_err());
    }

    #[test]
    fn test_rpmvercmp_basics() {
        assert_eq!(rpmvercmp("1.0", "1.0"), Ordering::Equal);
        assert_eq!(rpmvercmp("1.0", "2.0"), Ordering::Less);
        assert_eq!(rpmvercmp("2.0.1", "2.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.010", "1.10"), Ordering::Equal);
        assert_eq!(rpmvercmp("2a", "2.0"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0a", "1.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("5.5p1", "5.5p10"), Ordering::Less);
        assert_eq!(rpmvercmp("1.el9", "1.el8"), Ordering::Greater);
    }

    #[test]
    fn test_rpmvercmp_tilde_and_caret() {
        assert_eq!(rpmvercmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0^git1", "1.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.0^git1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_rpm_version_compare_epochs() {
        assert!(v("1:1.0.0") > v("0:2.0.0"));
    }

    #[test]
    fn test_rpm_version_compare_releases() {
        assert!(v("9.16.23-1.el9") < v("9.16.23-11.el9"));
        assert!(v("1.2.3") < v("1.2.3-1"));
    }

    #[test]
    fn test_ord_consistent_with_eq() {
        assert_ne!(v("1.0"), v("1.00"));
        assert_ne!(v("1.0").cmp(&v("1.00")), Ordering::Equal);
        assert_eq!(v("1.0").compare(&v("1.00")), Ordering::Equal);
    }

    #[test]
    fn test_constraint_ignores_missing_release() {
        let c = VersionConstraint::parse(">= 9.17").unwrap();
        assert!(!c.satisfies(&v("9.16.23-1.el9")));
        assert!(VersionConstraint::parse(">= 32:9.16").unwrap().satisfies(&v("32:9.16.23-1.el9")));
        assert!(VersionConstraint::parse(">= 9.16").unwrap().satisfies(&v("32:9.16.23-1.el9")));
        assert!(VersionConstraint::parse("= 1.0").unwrap().satisfies(&v("1.0-3.el9")));
    }

    #[test]
    fn test_version_constraint_parse_greater_or_equal() {
        let c = VersionConstraint::parse(">= 1.2.0").unwrap();
        assert!(c.satisfies(&v("1.2.0")));
        assert!(c.satisfies(&v("1.3.0")));
        assert!(!c.satisfies(&v("1.1.0")));
    }

    #[test]
    fn test_version_constraint_from_flags() {
        let c = VersionConstraint::from_flags(Some("LT"), Some(v("2.0"))).unwrap();
        assert_eq!(c, VersionConstraint::LessThan(v("2.0")));
        assert_eq!(
            VersionConstraint::from_flags(None, None).unwrap(),
            VersionConstraint::Any
        );
        assert!(VersionConstraint::from_flags(Some("XX"), Some(v("1"))).is_err());
    }

    #[test]
    fn test_overlaps() {
        let ge2 = VersionConstraint::parse(">= 2.0").unwrap();
        let lt2 = VersionConstraint::parse("< 2.0").unwrap();
        let eq21 = VersionConstraint::parse("= 2.1").unwrap();
        let eq15 = VersionConstraint::parse("= 1.5").unwrap();

        assert!(ge2.overlaps(&eq21));
        assert!(!ge2.overlaps(&eq15));
        assert!(lt2.overlaps(&eq15));
        assert!(!ge2.overlaps(&lt2));
        assert!(VersionConstraint::Any.overlaps(&ge2));
    }

    #[test]
    fn test_version_constraint_display() {
        let c1 = VersionConstraint::parse(">= 1.2.0").unwrap();
        assert_eq!(c1.to_string(), ">= 1.2.0");
        assert_eq!(v("2:1.2.3-4.el8").to_string(), "2:1.2.3-4.el8");
        assert_eq!(v("1.2.3-4").to_evr_string(), "0:1.2.3-4");
    }
}
