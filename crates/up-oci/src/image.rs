//! Immutable in-memory OCI image.
//!
//! Every builder method consumes the image and returns a new one. Images
//! pulled from a registry keep their original manifest and config bytes so
//! their digest matches the remote one; any modification drops those bytes
//! and the documents are re-rendered from the model.

use std::collections::BTreeMap;

use up_utils::hash::sha256_digest;

use crate::{
    error::{OciError, Result},
    layer::Layer,
    types::{Descriptor, ImageConfig, Manifest, MEDIA_TYPE_CONFIG, MEDIA_TYPE_MANIFEST},
};

#[derive(Debug, Clone)]
struct RawDocuments {
    manifest: Vec<u8>,
    config: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Image {
    config: ImageConfig,
    layers: Vec<Layer>,
    raw: Option<RawDocuments>,
}

impl Default for Image {
    fn default() -> Self {
        Self::empty()
    }
}

impl Image {
    /// An image with no layers and an empty config.
    pub fn empty() -> Self {
        Self {
            config: ImageConfig::default(),
            layers: Vec::new(),
            raw: None,
        }
    }

    /// Assembles an image from an existing manifest, its config blob and the
    /// layer blobs in manifest order.
    pub fn from_parts(
        manifest_bytes: Vec<u8>,
        config_bytes: Vec<u8>,
        layer_blobs: Vec<Vec<u8>>,
    ) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;
        let config: ImageConfig = serde_json::from_slice(&config_bytes)?;

        let actual = sha256_digest(&config_bytes);
        if actual != manifest.config.digest {
            return Err(OciError::DigestMismatch {
                expected: manifest.config.digest,
                actual,
            });
        }

        if manifest.layers.len() != layer_blobs.len() {
            return Err(OciError::InvalidResponse(format!(
                "manifest lists {} layers but {} were supplied",
                manifest.layers.len(),
                layer_blobs.len()
            )));
        }

        let layers = manifest
            .layers
            .iter()
            .zip(layer_blobs)
            .map(|(desc, blob)| {
                let layer = Layer::from_compressed(blob)?;
                if layer.digest() != desc.digest {
                    return Err(OciError::DigestMismatch {
                        expected: desc.digest.clone(),
                        actual: layer.digest().to_string(),
                    });
                }
                Ok(layer.with_annotations(desc.annotations.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            layers,
            raw: Some(RawDocuments {
                manifest: manifest_bytes,
                config: config_bytes,
            }),
        })
    }

    /// Assembles an image from a config and layers without an original
    /// manifest, e.g. when read back from a tarball.
    pub fn from_config_and_layers(config_bytes: Vec<u8>, layers: Vec<Layer>) -> Result<Self> {
        let config: ImageConfig = serde_json::from_slice(&config_bytes)?;

        if config.rootfs.diff_ids.len() != layers.len() {
            return Err(OciError::InvalidTarball(format!(
                "config lists {} diff IDs but {} layers were found",
                config.rootfs.diff_ids.len(),
                layers.len()
            )));
        }
        for (expected, layer) in config.rootfs.diff_ids.iter().zip(&layers) {
            if expected != layer.diff_id() {
                return Err(OciError::DigestMismatch {
                    expected: expected.clone(),
                    actual: layer.diff_id().to_string(),
                });
            }
        }

        Ok(Self {
            config,
            layers,
            raw: None,
        })
    }

    /// Returns a new image with `layer` appended.
    pub fn append_layer(mut self, layer: Layer) -> Self {
        self.config.rootfs.diff_ids.push(layer.diff_id().to_string());
        self.layers.push(layer);
        self.raw = None;
        self
    }

    /// Returns a new image with a config label set.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.config.labels.insert(key.into(), value.into());
        self.raw = None;
        self
    }

    /// Returns a new image where the layer at `index` has an extra annotation.
    pub fn annotate_layer(
        mut self,
        index: usize,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let layer = self
            .layers
            .get_mut(index)
            .ok_or_else(|| OciError::LayerNotFound(format!("#{index}")))?;
        *layer = layer.clone().with_annotation(key, value);
        self.raw = None;
        Ok(self)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.config.config.labels
    }

    pub fn config_bytes(&self) -> Result<Vec<u8>> {
        match &self.raw {
            Some(raw) => Ok(raw.config.clone()),
            None => Ok(serde_json::to_vec(&self.config)?),
        }
    }

    pub fn config_digest(&self) -> Result<String> {
        Ok(sha256_digest(&self.config_bytes()?))
    }

    pub fn manifest(&self) -> Result<Manifest> {
        if let Some(raw) = &self.raw {
            return Ok(serde_json::from_slice(&raw.manifest)?);
        }

        let config = self.config_bytes()?;
        Ok(Manifest {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_MANIFEST.to_string()),
            config: Descriptor {
                media_type: MEDIA_TYPE_CONFIG.to_string(),
                digest: sha256_digest(&config),
                size: config.len() as u64,
                annotations: BTreeMap::new(),
            },
            layers: self.layers.iter().map(Layer::descriptor).collect(),
            annotations: BTreeMap::new(),
        })
    }

    pub fn manifest_bytes(&self) -> Result<Vec<u8>> {
        match &self.raw {
            Some(raw) => Ok(raw.manifest.clone()),
            None => Ok(serde_json::to_vec(&self.manifest()?)?),
        }
    }

    pub fn media_type(&self) -> Result<String> {
        Ok(self
            .manifest()?
            .media_type
            .unwrap_or_else(|| MEDIA_TYPE_MANIFEST.to_string()))
    }

    /// The image digest: sha256 of the manifest document.
    pub fn digest(&self) -> Result<String> {
        Ok(sha256_digest(&self.manifest_bytes()?))
    }
}
