// src/repository/modules.rs

//! Module stream metadata (`modules.yaml`)
//!
//! The document is a YAML stream mixing `modulemd` entries, which list the
//! packages built for a stream, and `modulemd-defaults` entries, which name
//! the default stream of a module.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::metadata::{ModuleTag, PackageMetadata};

/// One stream of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStream {
    pub name: String,
    pub stream: String,
    /// Platform streams from the runtime `platform` requirement
    pub platforms: Vec<String>,
    /// Package NEVRAs built for this stream
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    pub streams: Vec<ModuleStream>,
    /// Module name → default stream
    pub defaults: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawDocument {
    document: String,
    #[serde(default)]
    data: Value,
}

/// YAML scalars like `stream: 18` arrive as numbers
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalars(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}

/// Canonical NEVRA: artifacts may omit a zero epoch
fn canonical_nevra(nevra: &str) -> String {
    if nevra.contains(':') {
        return nevra.to_string();
    }
    // name-version-release.arch: epoch goes before the version
    let Some((rest, release_arch)) = nevra.rsplit_once('-') else {
        return nevra.to_string();
    };
    match rest.rsplit_once('-') {
        Some((name, version)) => format!("{}-0:{}-{}", name, version, release_arch),
        None => nevra.to_string(),
    }
}

impl ModuleIndex {
    /// Parse a `modules.yaml` document stream
    pub fn parse(yaml: &[u8]) -> Result<Self> {
        let mut index = ModuleIndex::default();

        for document in serde_yaml::Deserializer::from_slice(yaml) {
            let raw = RawDocument::deserialize(document)
                .map_err(|e| Error::Parse(format!("Failed to parse modules.yaml: {}", e)))?;

            match raw.document.as_str() {
                "modulemd" => index.streams.push(Self::parse_stream(&raw.data)?),
                "modulemd-defaults" => {
                    let module = raw.data.get("module").and_then(scalar);
                    let stream = raw.data.get("stream").and_then(scalar);
                    if let (Some(module), Some(stream)) = (module, stream) {
                        index.defaults.insert(module, stream);
                    }
                }
                other => debug!("Ignoring modules.yaml document '{}'", other),
            }
        }

        Ok(index)
    }

    fn parse_stream(data: &Value) -> Result<ModuleStream> {
        let field = |key: &str| {
            data.get(key).and_then(scalar).ok_or_else(|| {
                Error::Parse(format!("modulemd document without '{}'", key))
            })
        };

        let mut platforms = Vec::new();
        if let Some(Value::Sequence(deps)) = data.get("dependencies") {
            for dep in deps {
                if let Some(platform) = dep.get("requires").and_then(|r| r.get("platform")) {
                    platforms.extend(scalars(platform));
                }
            }
        }

        let artifacts = data
            .get("artifacts")
            .and_then(|a| a.get("rpms"))
            .map(scalars)
            .unwrap_or_default()
            .iter()
            .map(|n| canonical_nevra(n))
            .collect();

        Ok(ModuleStream {
            name: field("name")?,
            stream: field("stream")?,
            platforms,
            artifacts,
        })
    }

    /// Tag every package that belongs to a module stream
    pub fn apply(&self, packages: &mut [PackageMetadata]) {
        let mut by_nevra: HashMap<&str, &ModuleStream> = HashMap::new();
        for stream in &self.streams {
            for artifact in &stream.artifacts {
                by_nevra.insert(artifact.as_str(), stream);
            }
        }

        let mut tagged = 0usize;
        for pkg in packages.iter_mut() {
            let Some(stream) = by_nevra.get(pkg.nevra().as_str()) else {
                continue;
            };
            pkg.module = Some(ModuleTag {
                name: stream.name.clone(),
                stream: stream.stream.clone(),
                platforms: stream.platforms.clone(),
                default: self.defaults.get(&stream.name) == Some(&stream.stream),
            });
            tagged += 1;
        }

        let listed: usize = self.streams.iter().map(|s| s.artifacts.len()).sum();
        if tagged == 0 && listed > 0 {
            warn!("modules.yaml lists {} artifacts but none are in primary", listed);
        }
        debug!("Tagged {} modular packages", tagged);
    }
}
