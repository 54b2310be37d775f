//! Compression codecs, looked up by the `compression` config value.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::StorageError;

pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Suffix appended after the file-kind extension, if any.
    fn extension(&self) -> Option<&'static str>;

    fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>, StorageError>;

    fn extract(&self, data: Vec<u8>) -> Result<Vec<u8>, StorageError>;

    /// `csv` becomes `csv.gz` for gzip and stays `csv` uncompressed.
    fn compose_filetype(&self, extension: &str) -> String {
        match self.extension() {
            Some(suffix) => format!("{extension}.{suffix}"),
            None => extension.to_string(),
        }
    }
}

pub struct Identity;

impl Codec for Identity {
    fn name(&self) -> &'static str {
        "none"
    }

    fn extension(&self) -> Option<&'static str> {
        None
    }

    fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
        Ok(data)
    }

    fn extract(&self, data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
        Ok(data)
    }
}

pub struct Gzip;

impl Codec for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extension(&self) -> Option<&'static str> {
        Some("gz")
    }

    fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&data)
            .map_err(|e| StorageError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| StorageError::Compression(e.to_string()))
    }

    fn extract(&self, data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
        let mut decoder = GzDecoder::new(data.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| StorageError::Compression(e.to_string()))?;
        Ok(out)
    }
}

static CODECS: &[(&str, &dyn Codec)] = &[("gzip", &Gzip), ("none", &Identity)];

/// Resolves a codec by name; no name means no compression.
pub fn codec(name: Option<&str>) -> Result<&'static dyn Codec, StorageError> {
    let Some(name) = name else {
        return Ok(&Identity);
    };

    CODECS
        .iter()
        .find(|(codec_name, _)| *codec_name == name)
        .map(|(_, codec)| *codec)
        .ok_or_else(|| StorageError::Configuration(format!("Unknown compression `{name}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trips_and_changes_bytes() {
        let gzip = codec(Some("gzip")).unwrap();
        let compressed = gzip.compress(b"id,name\n1,a\n".to_vec()).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert_eq!(gzip.extract(compressed).unwrap(), b"id,name\n1,a\n");
    }

    #[test]
    fn filetypes() {
        assert_eq!(codec(None).unwrap().compose_filetype("csv"), "csv");
        assert_eq!(codec(Some("gzip")).unwrap().compose_filetype("csv"), "csv.gz");
    }

    #[test]
    fn unknown_codec_is_rejected() {
        assert!(matches!(
            codec(Some("zstd")),
            Err(StorageError::Configuration(_))
        ));
    }
}
