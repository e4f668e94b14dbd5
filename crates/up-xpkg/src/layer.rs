//! Package layers and their `io.crossplane.xpkg` annotations.

use up_oci::{Image, Layer, OciError};

/// Annotation key marking the role of a package layer.
pub const ANNOTATION_KEY: &str = "io.crossplane.xpkg";
pub const BASE_ANNOTATION: &str = "base";
pub const EXAMPLES_ANNOTATION: &str = "upbound.io/examples";

pub const PACKAGE_FILE: &str = "package.yaml";
pub const EXAMPLES_FILE: &str = "examples.yaml";

/// Wraps `content` as the only file of a tar stream, gzips it and annotates
/// the resulting layer.
///
/// Headers carry fixed ownership, mode and mtime so identical content yields
/// identical digests.
pub fn layer(content: &[u8], file_name: &str, annotation: &str) -> Result<Layer, OciError> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    builder.append_data(&mut header, file_name, content)?;
    let tar = builder.into_inner()?;

    Ok(Layer::from_tar(&tar)?.with_annotation(ANNOTATION_KEY, annotation))
}

/// Config label mirroring a layer annotation: `io.crossplane.xpkg:<digest>`.
pub fn label_key(layer_digest: &str) -> String {
    format!("{ANNOTATION_KEY}:{layer_digest}")
}

/// Appends `layer` and mirrors its annotation into the config labels.
pub fn append_annotated(image: Image, layer: Layer) -> Image {
    let label = layer
        .annotation(ANNOTATION_KEY)
        .map(|value| (label_key(layer.digest()), value.to_string()));

    let image = image.append_layer(layer);
    match label {
        Some((key, value)) => image.with_label(key, value),
        None => image,
    }
}

/// The package role of `layer`, from its annotation or the mirrored label.
pub fn layer_role<'a>(image: &'a Image, layer: &'a Layer) -> Option<&'a str> {
    layer.annotation(ANNOTATION_KEY).or_else(|| {
        image
            .labels()
            .get(&label_key(layer.digest()))
            .map(String::as_str)
    })
}

pub fn find_layer<'a>(image: &'a Image, role: &str) -> Option<&'a Layer> {
    image
        .layers()
        .iter()
        .find(|layer| layer_role(image, layer) == Some(role))
}

/// Restores layer annotations from config labels, e.g. after reading an
/// image back from a tarball, so the pushed manifest carries them.
pub fn annotate_image(image: Image) -> Result<Image, OciError> {
    let missing: Vec<(usize, String)> = image
        .layers()
        .iter()
        .enumerate()
        .filter(|(_, layer)| layer.annotation(ANNOTATION_KEY).is_none())
        .filter_map(|(index, layer)| {
            image
                .labels()
                .get(&label_key(layer.digest()))
                .map(|value| (index, value.clone()))
        })
        .collect();

    missing
        .into_iter()
        .try_fold(image, |image, (index, value)| {
            image.annotate_layer(index, ANNOTATION_KEY, value)
        })
}

/// Reads the package stream stored in the image's base layer.
pub fn read_package_stream(image: &Image) -> Result<Option<Vec<u8>>, OciError> {
    match find_layer(image, BASE_ANNOTATION) {
        Some(layer) => layer.read_file(PACKAGE_FILE).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use up_oci::tarball;

    use super::*;

    #[test]
    fn test_layer_is_single_file_and_annotated() {
        let layer = layer(b"kind: Provider\n", PACKAGE_FILE, BASE_ANNOTATION).unwrap();
        assert_eq!(layer.annotation(ANNOTATION_KEY), Some(BASE_ANNOTATION));
        assert_eq!(layer.read_file(PACKAGE_FILE).unwrap(), b"kind: Provider\n");

        let tar = layer.uncompressed().unwrap();
        let mut archive = tar::Archive::new(tar.as_slice());
        assert_eq!(archive.entries().unwrap().count(), 1);
    }

    #[test]
    fn test_layer_digest_is_stable() {
        let a = layer(b"same", PACKAGE_FILE, BASE_ANNOTATION).unwrap();
        let b = layer(b"same", PACKAGE_FILE, BASE_ANNOTATION).unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_append_annotated_mirrors_label() {
        let base = layer(b"a: b\n", PACKAGE_FILE, BASE_ANNOTATION).unwrap();
        let digest = base.digest().to_string();
        let image = append_annotated(Image::empty(), base);

        assert_eq!(
            image.labels().get(&label_key(&digest)).map(String::as_str),
            Some(BASE_ANNOTATION)
        );
        assert!(find_layer(&image, BASE_ANNOTATION).is_some());
        assert!(find_layer(&image, EXAMPLES_ANNOTATION).is_none());
    }

    #[test]
    fn test_annotations_survive_tarball() {
        let base = layer(b"a: b\n", PACKAGE_FILE, BASE_ANNOTATION).unwrap();
        let image = append_annotated(Image::empty(), base);

        let mut buffer = Vec::new();
        tarball::write_to(&mut buffer, &image, &[]).unwrap();
        let loaded = tarball::read_from(buffer.as_slice()).unwrap();

        assert!(loaded.layers()[0].annotation(ANNOTATION_KEY).is_none());
        assert!(find_layer(&loaded, BASE_ANNOTATION).is_some());

        let restored = annotate_image(loaded).unwrap();
        assert_eq!(
            restored.layers()[0].annotation(ANNOTATION_KEY),
            Some(BASE_ANNOTATION)
        );
        assert_eq!(restored.digest().unwrap(), image.digest().unwrap());
    }

    #[test]
    fn test_read_package_stream() {
        let image = append_annotated(
            Image::empty(),
            layer(b"stream", PACKAGE_FILE, BASE_ANNOTATION).unwrap(),
        );
        assert_eq!(read_package_stream(&image).unwrap().unwrap(), b"stream");
        assert!(read_package_stream(&Image::empty()).unwrap().is_none());
    }
}
