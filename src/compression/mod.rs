// src/compression/mod.rs
//! Decompression of repository metadata files
//!
//! rpm-md repositories publish `primary` and `modules` data as gzip, xz or
//! zstd. The format is taken from the file name when it has a known
//! extension and from the magic bytes otherwise.

use crate::error::{Error, Result};
use std::io::Read;

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (raw data)
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstandard compression (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    pub fn from_extension(path: &str) -> Self {
        if path.ends_with(".gz") {
            Self::Gzip
        } else if path.ends_with(".xz") {
            Self::Xz
        } else if path.ends_with(".zst") || path.ends_with(".zstd") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect compression format from magic bytes
    ///
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decompress `data` using the specified format
pub fn decompress(data: &[u8], format: CompressionFormat) -> Result<Vec<u8>> {
    let mut reader: Box<dyn Read + '_> = match format {
        CompressionFormat::None => return Ok(data.to_vec()),
        CompressionFormat::Gzip => Box::new(flate2::read::GzDecoder::new(data)),
        CompressionFormat::Xz => Box::new(xz2::read::XzDecoder::new(data)),
        CompressionFormat::Zstd => Box::new(zstd::Decoder::new(data).map_err(|e| {
            Error::Parse(format!("Failed to create zstd decoder: {}", e))
        })?),
    };

    let mut output = Vec::new();
    reader
        .read_to_end(&mut output)
        .map_err(|e| Error::Parse(format!("Failed to decompress {} data: {}", format, e)))?;
    Ok(output)
}

/// Decompress a metadata file, using its name as a hint
///
/// Magic bytes win when the name carries no extension we recognize, so a
/// mislabelled plain file still decodes.
pub fn decompress_metadata(name: &str, data: &[u8]) -> Result<Vec<u8>> {
    let format = match CompressionFormat::from_extension(name) {
        CompressionFormat::None => CompressionFormat::from_magic_bytes(data),
        hinted => hinted,
    };
    decompress(data, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CompressionFormat::from_extension("primary.xml.gz"), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_extension("primary.xml.xz"), CompressionFormat::Xz);
        assert_eq!(CompressionFormat::from_extension("primary.xml.zst"), CompressionFormat::Zstd);
        assert_eq!(CompressionFormat::from_extension("primary.xml"), CompressionFormat::None);
    }

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f, 0x8b, 0x08]),
            CompressionFormat::Gzip
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x28, 0xb5, 0x2f, 0xfd]),
            CompressionFormat::Zstd
        );
        assert_eq!(CompressionFormat::from_magic_bytes(b"<?xml"), CompressionFormat::None);
        assert_eq!(CompressionFormat::from_magic_bytes(&[0x1f]), CompressionFormat::None);
    }

    #[test]
    fn test_decompress_metadata_by_name_and_magic() {
        let packed = gzip(b"<metadata/>");
        assert_eq!(decompress_metadata("primary.xml.gz", &packed).unwrap(), b"<metadata/>");
        assert_eq!(decompress_metadata("primary", &packed).unwrap(), b"<metadata/>");
        assert_eq!(decompress_metadata("primary.xml", b"plain").unwrap(), b"plain");
    }

    #[test]
    fn test_decompress_zstd() {
        let packed = zstd::encode_all(&b"modules"[..], 0).unwrap();
        assert_eq!(decompress_metadata("modules.yaml.zst", &packed).unwrap(), b"modules");
    }

    #[test]
    fn test_corrupt_gzip_is_parse_error() {
        let err = decompress_metadata("primary.xml.gz", &[0x1f, 0x8b, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
