use std::{
    collections::BTreeMap,
    io::{Read, Write},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use up_utils::hash::sha256_digest;

use crate::{
    error::{OciError, Result},
    types::{Descriptor, MEDIA_TYPE_LAYER_GZIP},
};

/// A gzip-compressed tar layer held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    blob: Vec<u8>,
    digest: String,
    diff_id: String,
    annotations: BTreeMap<String, String>,
}

impl Layer {
    /// Compresses an uncompressed tar stream into a layer.
    pub fn from_tar(tar: &[u8]) -> Result<Self> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(tar)?;
        let blob = encoder.finish()?;

        Ok(Self {
            digest: sha256_digest(&blob),
            diff_id: sha256_digest(tar),
            blob,
            annotations: BTreeMap::new(),
        })
    }

    /// Wraps an already compressed blob, computing its diff ID.
    pub fn from_compressed(blob: Vec<u8>) -> Result<Self> {
        let tar = decompress(&blob)?;
        Ok(Self {
            digest: sha256_digest(&blob),
            diff_id: sha256_digest(&tar),
            blob,
            annotations: BTreeMap::new(),
        })
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations.extend(annotations);
        self
    }

    /// Digest of the compressed blob.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Digest of the uncompressed tar stream.
    pub fn diff_id(&self) -> &str {
        &self.diff_id
    }

    pub fn size(&self) -> u64 {
        self.blob.len() as u64
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn uncompressed(&self) -> Result<Vec<u8>> {
        decompress(&self.blob)
    }

    /// Reads the content of the first regular file named `name` in the layer.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let tar = self.uncompressed()?;
        let mut archive = tar::Archive::new(tar.as_slice());

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?;
            let matches = path.to_str().map(|p| p.trim_start_matches("./")) == Some(name);
            if matches && entry.header().entry_type().is_file() {
                let mut content = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut content)?;
                return Ok(content);
            }
        }

        Err(OciError::LayerNotFound(format!("{} (file {name})", self.digest)))
    }

    pub fn descriptor(&self) -> Descriptor {
        Descriptor {
            media_type: MEDIA_TYPE_LAYER_GZIP.to_string(),
            digest: self.digest.clone(),
            size: self.size(),
            annotations: self.annotations.clone(),
        }
    }
}

fn decompress(blob: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(blob);
    let mut tar = Vec::new();
    decoder.read_to_end(&mut tar)?;
    Ok(tar)
}
