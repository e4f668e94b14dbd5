//! Image tarballs in the `docker save` layout.
//!
//! ```text
//! manifest.json        [{"Config": "sha256:<hex>", "RepoTags": [...], "Layers": ["<hex>.tar.gz"]}]
//! sha256:<hex>         image config
//! <hex>.tar.gz         one file per layer
//! ```

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use tracing::debug;
use up_utils::hash::SHA256_PREFIX;

use crate::{
    error::{OciError, Result},
    image::Image,
    layer::Layer,
    types::TarballEntry,
};

const MANIFEST_FILE: &str = "manifest.json";

fn layer_file_name(digest: &str) -> String {
    format!("{}.tar.gz", digest.trim_start_matches(SHA256_PREFIX))
}

fn append_entry<W: Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, name, data)?;
    Ok(())
}

/// Writes `image` as a tarball to `writer`.
pub fn write_to<W: Write>(writer: W, image: &Image, repo_tags: &[String]) -> Result<()> {
    let config = image.config_bytes()?;
    let config_name = image.config_digest()?;

    let entry = TarballEntry {
        config: config_name.clone(),
        repo_tags: repo_tags.to_vec(),
        layers: image
            .layers()
            .iter()
            .map(|layer| layer_file_name(layer.digest()))
            .collect(),
    };
    let manifest = serde_json::to_vec(&[entry])?;

    let mut builder = tar::Builder::new(writer);
    append_entry(&mut builder, &config_name, &config)?;
    for layer in image.layers() {
        append_entry(&mut builder, &layer_file_name(layer.digest()), layer.blob())?;
    }
    append_entry(&mut builder, MANIFEST_FILE, &manifest)?;
    builder.into_inner()?.flush()?;

    Ok(())
}

/// Writes `image` as a tarball at `path`, replacing any existing file.
pub fn write(path: &Path, image: &Image, repo_tags: &[String]) -> Result<()> {
    let file = File::create(path)?;
    write_to(BufWriter::new(file), image, repo_tags)?;
    debug!("wrote image tarball {}", path.display());
    Ok(())
}

/// Reads the first image of a tarball from `reader`.
pub fn read_from<R: Read>(reader: R) -> Result<Image> {
    let mut files: HashMap<String, Vec<u8>> = HashMap::new();
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().trim_start_matches("./").to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        files.insert(name, data);
    }

    let manifest = files
        .get(MANIFEST_FILE)
        .ok_or_else(|| OciError::InvalidTarball(format!("missing {MANIFEST_FILE}")))?;
    let entries: Vec<TarballEntry> = serde_json::from_slice(manifest)?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| OciError::InvalidTarball(format!("{MANIFEST_FILE} lists no images")))?;

    let config = files
        .remove(&entry.config)
        .ok_or_else(|| OciError::InvalidTarball(format!("missing config {}", entry.config)))?;

    let layers = entry
        .layers
        .iter()
        .map(|name| {
            let blob = files
                .remove(name)
                .ok_or_else(|| OciError::InvalidTarball(format!("missing layer {name}")))?;
            Layer::from_compressed(blob)
        })
        .collect::<Result<Vec<_>>>()?;

    Image::from_config_and_layers(config, layers)
}

/// Reads the image stored in the tarball at `path`.
pub fn read(path: &Path) -> Result<Image> {
    let file = File::open(path)?;
    read_from(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn sample_image() -> Image {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        let content = b"apiVersion: v1\n";
        header.set_size(content.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, "package.yaml", &content[..])
            .unwrap();
        let layer = Layer::from_tar(&builder.into_inner().unwrap()).unwrap();
        let digest = layer.digest().to_string();

        Image::empty()
            .append_layer(layer.with_annotation("io.crossplane.xpkg", "base"))
            .with_label(format!("io.crossplane.xpkg:{digest}"), "base")
    }

    #[test]
    fn test_write_layout() {
        let image = sample_image();
        let mut buffer = Vec::new();
        write_to(&mut buffer, &image, &["pkg:latest".to_string()]).unwrap();

        let mut archive = tar::Archive::new(buffer.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();

        let config_name = image.config_digest().unwrap();
        let layer_name = layer_file_name(image.layers()[0].digest());
        assert_eq!(names, vec![config_name, layer_name, "manifest.json".to_string()]);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pkg.xpkg");
        let image = sample_image();

        write(&path, &image, &[]).unwrap();
        let loaded = read(&path).unwrap();

        assert_eq!(loaded.layers().len(), 1);
        assert_eq!(loaded.layers()[0].digest(), image.layers()[0].digest());
        assert_eq!(loaded.config_digest().unwrap(), image.config_digest().unwrap());
        assert_eq!(loaded.labels(), image.labels());
    }

    #[test]
    fn test_read_missing_manifest() {
        let mut builder = tar::Builder::new(Vec::new());
        append_entry(&mut builder, "other", b"x").unwrap();
        let data = builder.into_inner().unwrap();

        assert!(matches!(
            read_from(data.as_slice()),
            Err(OciError::InvalidTarball(_))
        ));
    }

    #[test]
    fn test_write_is_deterministic() {
        let image = sample_image();
        let mut first = Vec::new();
        let mut second = Vec::new();
        write_to(&mut first, &image, &[]).unwrap();
        write_to(&mut second, &image, &[]).unwrap();
        assert_eq!(first, second);
    }
}
