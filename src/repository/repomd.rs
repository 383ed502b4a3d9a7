// src/repository/repomd.rs

//! rpm-md (`repodata/`) parsing
//!
//! Only the parts dependency resolution needs are read: the `repomd.xml`
//! index, the `primary` package list and, through [`super::modules`], the
//! `modules` document.

use crate::arch::SRC;
use crate::error::{Error, Result};
use crate::hash::{Checksum, ChecksumType};
use crate::version::{RpmVersion, VersionConstraint};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use tracing::debug;

use super::metadata::{Capability, PackageMetadata};

/// Path of the index relative to the repository base
pub const REPOMD_PATH: &str = "repodata/repomd.xml";

/// One `<data>` entry of `repomd.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepomdEntry {
    pub data_type: String,
    pub location: String,
    pub checksum: Option<Checksum>,
}

/// Parsed `repomd.xml`
#[derive(Debug, Clone, Default)]
pub struct Repomd {
    pub revision: Option<String>,
    pub entries: Vec<RepomdEntry>,
}

impl Repomd {
    pub fn entry(&self, data_type: &str) -> Option<&RepomdEntry> {
        self.entries.iter().find(|e| e.data_type == data_type)
    }

    pub fn primary(&self) -> Result<&RepomdEntry> {
        self.entry("primary")
            .ok_or_else(|| Error::Parse("repomd.xml has no primary data".to_string()))
    }

    pub fn modules(&self) -> Option<&RepomdEntry> {
        self.entry("modules")
    }
}

fn attrs(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Parse(format!("Bad XML attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Parse(format!("Bad XML attribute value: {}", e)))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn xml_error(what: &str, e: quick_xml::Error) -> Error {
    Error::Parse(format!("Failed to parse {}: {}", what, e))
}

/// Parse `repomd.xml`
pub fn parse_repomd(xml: &[u8]) -> Result<Repomd> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut repomd = Repomd::default();
    let mut buf = Vec::new();
    let mut current: Option<(String, Option<String>, Option<ChecksumType>, Option<String>)> = None;
    let mut text_target: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let a = attrs(&e)?;
                match e.local_name().as_ref() {
                    b"data" => {
                        let data_type = a.get("type").cloned().unwrap_or_default();
                        current = Some((data_type, None, None, None));
                    }
                    b"location" => {
                        if let Some(entry) = current.as_mut() {
                            entry.1 = a.get("href").cloned();
                        }
                    }
                    b"checksum" if current.is_some() => {
                        if let Some(entry) = current.as_mut() {
                            entry.2 = a.get("type").map(|t| t.parse()).transpose()?;
                        }
                        text_target = Some("checksum");
                    }
                    b"revision" => text_target = Some("revision"),
                    _ => text_target = None,
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| xml_error("repomd.xml", e))?
                    .into_owned();
                match text_target {
                    Some("checksum") => {
                        if let Some(entry) = current.as_mut() {
                            entry.3 = Some(text);
                        }
                    }
                    Some("revision") => repomd.revision = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                text_target = None;
                if e.local_name().as_ref() == b"data"
                    && let Some((data_type, location, algo, digest)) = current.take()
                {
                    let location = location.ok_or_else(|| {
                        Error::Parse(format!("repomd.xml entry '{}' has no location", data_type))
                    })?;
                    let checksum = match (algo, digest) {
                        (Some(algo), Some(digest)) => Some(Checksum::new(algo, digest)?),
                        _ => None,
                    };
                    repomd.entries.push(RepomdEntry {
                        data_type,
                        location,
                        checksum,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("repomd.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(repomd)
}

/// Which capability list an `rpm:entry` belongs to
#[derive(Clone, Copy)]
enum Section {
    Provides,
    Requires,
    Recommends,
    Conflicts,
}

#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    arch: Option<String>,
    epoch: u64,
    version: Option<String>,
    release: Option<String>,
    checksum_type: Option<ChecksumType>,
    checksum: Option<String>,
    location: Option<String>,
    provides: Vec<Capability>,
    requires: Vec<Capability>,
    recommends: Vec<Capability>,
    conflicts: Vec<Capability>,
    files: Vec<String>,
}

impl PackageBuilder {
    fn build(self) -> Result<PackageMetadata> {
        let name = self
            .name
            .ok_or_else(|| Error::Parse("package without name in primary".to_string()))?;
        let missing = |field: &str| Error::Parse(format!("package '{}' has no {}", name, field));

        let checksum = Checksum::new(
            self.checksum_type.unwrap_or_default(),
            self.checksum.ok_or_else(|| missing("checksum"))?,
        )?;

        Ok(PackageMetadata {
            arch: self.arch.ok_or_else(|| missing("arch"))?,
            epoch: self.epoch,
            version: self.version.ok_or_else(|| missing("version"))?,
            release: self.release.ok_or_else(|| missing("release"))?,
            location: self.location.ok_or_else(|| missing("location"))?,
            checksum,
            provides: self.provides,
            requires: self.requires,
            recommends: self.recommends,
            conflicts: self.conflicts,
            files: self.files,
            module: None,
            name,
        })
    }

    fn push(&mut self, section: Section, cap: Capability) {
        match section {
            Section::Provides => self.provides.push(cap),
            Section::Requires => self.requires.push(cap),
            Section::Recommends => self.recommends.push(cap),
            Section::Conflicts => self.conflicts.push(cap),
        }
    }
}

fn parse_entry(a: &HashMap<String, String>) -> Result<Capability> {
    let name = a
        .get("name")
        .ok_or_else(|| Error::Parse("rpm:entry without name".to_string()))?;
    let version = match a.get("ver") {
        Some(ver) => {
            let epoch = match a.get("epoch") {
                Some(e) => e
                    .parse()
                    .map_err(|_| Error::Parse(format!("invalid epoch '{}' for {}", e, name)))?,
                None => 0,
            };
            Some(RpmVersion::new(epoch, ver.clone(), a.get("rel").cloned()))
        }
        None => None,
    };
    let constraint = VersionConstraint::from_flags(a.get("flags").map(String::as_str), version)?;
    Ok(Capability::new(name.clone(), constraint))
}

/// Parse the `primary` package list
///
/// Source packages are skipped and `rpmlib(...)` requirements dropped,
/// neither takes part in resolution.
pub fn parse_primary(xml: &[u8]) -> Result<Vec<PackageMetadata>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();
    let mut pkg: Option<PackageBuilder> = None;
    let mut section: Option<Section> = None;
    let mut text_target: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                text_target = None;
                let local = e.local_name();
                let Some(p) = pkg.as_mut() else {
                    if local.as_ref() == b"package" {
                        pkg = Some(PackageBuilder::default());
                    }
                    buf.clear();
                    continue;
                };
                match local.as_ref() {
                    b"name" => text_target = Some("name"),
                    b"arch" => text_target = Some("arch"),
                    b"file" => text_target = Some("file"),
                    b"checksum" => {
                        let a = attrs(&e)?;
                        p.checksum_type = a.get("type").map(|t| t.parse()).transpose()?;
                        text_target = Some("checksum");
                    }
                    b"version" => {
                        let a = attrs(&e)?;
                        p.epoch = match a.get("epoch") {
                            Some(epoch) => epoch.parse().map_err(|_| {
                                Error::Parse(format!("invalid epoch '{}' in primary", epoch))
                            })?,
                            None => 0,
                        };
                        p.version = a.get("ver").cloned();
                        p.release = a.get("rel").cloned();
                    }
                    b"location" => p.location = attrs(&e)?.get("href").cloned(),
                    b"provides" => section = Some(Section::Provides),
                    b"requires" => section = Some(Section::Requires),
                    b"recommends" => section = Some(Section::Recommends),
                    b"conflicts" => section = Some(Section::Conflicts),
                    b"entry" => {
                        if let Some(s) = section {
                            let cap = parse_entry(&attrs(&e)?)?;
                            if !cap.is_rpmlib() {
                                p.push(s, cap);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(p), Some(target)) = (pkg.as_mut(), text_target) {
                    let text = t
                        .unescape()
                        .map_err(|e| xml_error("primary", e))?
                        .into_owned();
                    match target {
                        "name" => p.name = Some(text),
                        "arch" => p.arch = Some(text),
                        "checksum" => p.checksum = Some(text),
                        "file" => p.files.push(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                text_target = None;
                match e.local_name().as_ref() {
                    b"provides" | b"requires" | b"recommends" | b"conflicts" => section = None,
                    b"package" => {
                        if let Some(builder) = pkg.take() {
                            let package = builder.build()?;
                            if package.arch != SRC {
                                packages.push(package);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("primary", e)),
            _ => {}
        }
        buf.clear();
    }

    debug!("Parsed {} packages from primary", packages.len());
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1700000000</revision>
  <data type="primary">
    <checksum type="sha256">e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855</checksum>
    <open-checksum type="sha256">ab</open-checksum>
    <location href="repodata/abc-primary.xml.gz"/>
    <size>10</size>
  </data>
  <data type="modules">
    <checksum type="sha256">cd</checksum>
    <location href="repodata/abc-modules.yaml.xz"/>
  </data>
</repomd>"#;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="3">
<package type="rpm">
  <name>bind</name>
  <arch>x86_64</arch>
  <version epoch="32" ver="9.16.23" rel="1.el9"/>
  <checksum type="sha256" pkgid="YES">0123abcd</checksum>
  <location href="Packages/b/bind-9.16.23-1.el9.x86_64.rpm"/>
  <format>
    <rpm:provides>
      <rpm:entry name="bind" flags="EQ" epoch="32" ver="9.16.23" rel="1.el9"/>
      <rpm:entry name="config(bind)" flags="EQ" epoch="32" ver="9.16.23" rel="1.el9"/>
    </rpm:provides>
    <rpm:requires>
      <rpm:entry name="rpmlib(CompressedFileNames)" flags="LE" epoch="0" ver="3.0.4" rel="1"/>
      <rpm:entry name="bind-libs" flags="EQ" epoch="32" ver="9.16.23" rel="1.el9"/>
      <rpm:entry name="/bin/sh"/>
    </rpm:requires>
    <rpm:recommends>
      <rpm:entry name="bind-utils"/>
    </rpm:recommends>
    <file>/usr/sbin/named</file>
  </format>
</package>
<package type="rpm">
  <name>bind</name>
  <arch>src</arch>
  <version epoch="32" ver="9.16.23" rel="1.el9"/>
  <checksum type="sha256" pkgid="YES">ff</checksum>
  <location href="Packages/b/bind-9.16.23-1.el9.src.rpm"/>
</package>
<package type="rpm">
  <name>tzdata</name>
  <arch>noarch</arch>
  <version epoch="0" ver="2024a" rel="1.el9"/>
  <checksum type="sha256" pkgid="YES">ee</checksum>
  <location href="Packages/t/tzdata-2024a-1.el9.noarch.rpm"/>
  <format/>
</package>
</metadata>"#;

    #[test]
    fn test_parse_repomd() {
        let repomd = parse_repomd(REPOMD.as_bytes()).unwrap();
        assert_eq!(repomd.revision.as_deref(), Some("1700000000"));
        let primary = repomd.primary().unwrap();
        assert_eq!(primary.location, "repodata/abc-primary.xml.gz");
        assert_eq!(primary.checksum.as_ref().unwrap().algorithm, ChecksumType::Sha256);
        assert_eq!(
            repomd.modules().unwrap().location,
            "repodata/abc-modules.yaml.xz"
        );
    }

    #[test]
    fn test_repomd_without_primary() {
        let repomd = parse_repomd(b"<repomd></repomd>").unwrap();
        assert!(repomd.primary().is_err());
    }

    #[test]
    fn test_parse_primary() {
        let packages = parse_primary(PRIMARY.as_bytes()).unwrap();
        assert_eq!(packages.len(), 2);

        let bind = &packages[0];
        assert_eq!(bind.nevra(), "bind-32:9.16.23-1.el9.x86_64");
        assert_eq!(bind.checksum.digest, "0123abcd");
        assert_eq!(bind.location, "Packages/b/bind-9.16.23-1.el9.x86_64.rpm");
        assert_eq!(bind.provides.len(), 2);
        let requires: Vec<String> = bind.requires.iter().map(|c| c.to_string()).collect();
        assert_eq!(requires, vec!["bind-libs = 32:9.16.23-1.el9", "/bin/sh"]);
        assert_eq!(bind.recommends[0].name, "bind-utils");
        assert_eq!(bind.files, vec!["/usr/sbin/named".to_string()]);

        assert_eq!(packages[1].name, "tzdata");
        assert_eq!(packages[1].arch, "noarch");
    }

    #[test]
    fn test_primary_missing_checksum() {
        let xml = r#"<metadata><package type="rpm"><name>x</name><arch>noarch</arch>
            <version epoch="0" ver="1" rel="1"/><location href="x.rpm"/></package></metadata>"#;
        assert!(matches!(parse_primary(xml.as_bytes()), Err(Error::Parse(_))));
    }
}
