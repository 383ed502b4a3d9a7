// src/depsolve/filter.rs

//! Candidate filtering predicates
//!
//! Pure functions deciding whether a package may enter the candidate
//! universe of a solver. They take no I/O and no solver state.

use crate::arch::Arch;
use crate::repository::PackageMetadata;
use std::collections::HashMap;

/// Platform stream of a module platform id (`platform:el9` → `el9`)
pub fn platform_stream(platform_id: &str) -> &str {
    platform_id
        .split_once(':')
        .map(|(_, stream)| stream)
        .unwrap_or(platform_id)
}

/// Check if a package is installable on `arch`
pub fn arch_compatible(arch: Arch, pkg: &PackageMetadata) -> bool {
    arch.accepts(&pkg.arch)
}

/// Check if a package's module stream is active for this solve
///
/// * Non-modular packages always pass.
/// * A module built for other platforms never passes.
/// * Packages from a `module_hotfixes` repository skip stream selection.
/// * An explicitly enabled stream passes; another stream of a module with
///   an enabled stream does not.
/// * Otherwise only the module's default stream passes.
pub fn module_compatible(
    pkg: &PackageMetadata,
    platform_id: &str,
    enabled: &HashMap<String, String>,
    hotfix: bool,
) -> bool {
    let Some(module) = &pkg.module else {
        return true;
    };

    if !platform_id.is_empty() && !module.platforms.is_empty() {
        let platform = platform_stream(platform_id);
        if !module.platforms.iter().any(|p| p == platform) {
            return false;
        }
    }

    if hotfix {
        return true;
    }

    match enabled.get(&module.name) {
        Some(stream) => *stream == module.stream,
        None => module.default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{Checksum, ChecksumType};
    use crate::repository::ModuleTag;

    fn pkg(arch: &str, module: Option<(&str, &str, bool)>) -> PackageMetadata {
        PackageMetadata {
            name: "nodejs".to_string(),
            epoch: 1,
            version: "18.14.2".to_string(),
            release: "2.module_el9".to_string(),
            arch: arch.to_string(),
            checksum: Checksum::new(ChecksumType::Sha256, "aa").unwrap(),
            location: "Packages/nodejs.rpm".to_string(),
            provides: Vec::new(),
            requires: Vec::new(),
            recommends: Vec::new(),
            conflicts: Vec::new(),
            files: Vec::new(),
            module: module.map(|(name, stream, default)| ModuleTag {
                name: name.to_string(),
                stream: stream.to_string(),
                platforms: vec!["el9".to_string()],
                default,
            }),
        }
    }

    fn enabled(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(m, s)| (m.to_string(), s.to_string()))
            .collect()
    }

    #[test]
    fn test_platform_stream() {
        assert_eq!(platform_stream("platform:el9"), "el9");
        assert_eq!(platform_stream("el9"), "el9");
    }

    #[test]
    fn test_arch_compatible() {
        assert!(arch_compatible(Arch::X86_64, &pkg("x86_64", None)));
        assert!(arch_compatible(Arch::X86_64, &pkg("noarch", None)));
        assert!(!arch_compatible(Arch::X86_64, &pkg("aarch64", None)));
        assert!(!arch_compatible(Arch::X86_64, &pkg("src", None)));
    }

    #[test]
    fn test_non_modular_always_passes() {
        assert!(module_compatible(&pkg("x86_64", None), "platform:el9", &enabled(&[]), false));
    }

    #[test]
    fn test_default_stream() {
        let none = enabled(&[]);
        let stream_18 = pkg("x86_64", Some(("nodejs", "18", true)));
        let stream_20 = pkg("x86_64", Some(("nodejs", "20", false)));
        assert!(module_compatible(&stream_18, "platform:el9", &none, false));
        assert!(!module_compatible(&stream_20, "platform:el9", &none, false));
    }

    #[test]
    fn test_enabled_stream_overrides_default() {
        let on = enabled(&[("nodejs", "20")]);
        let stream_18 = pkg("x86_64", Some(("nodejs", "18", true)));
        let stream_20 = pkg("x86_64", Some(("nodejs", "20", false)));
        assert!(module_compatible(&stream_20, "platform:el9", &on, false));
        assert!(!module_compatible(&stream_18, "platform:el9", &on, false));
    }

    #[test]
    fn test_platform_mismatch_excludes_even_hotfix() {
        let p = pkg("x86_64", Some(("nodejs", "18", true)));
        assert!(!module_compatible(&p, "platform:el8", &enabled(&[]), true));
        assert!(module_compatible(&p, "platform:el9", &enabled(&[("nodejs", "20")]), true));
    }
}
