use tracing::{debug, info};
use up_oci::Image;

use crate::{
    backend::Backend,
    error::{LintError, XpkgError, XpkgResult},
    layer::{append_annotated, layer, BASE_ANNOTATION, EXAMPLES_ANNOTATION, EXAMPLES_FILE, PACKAGE_FILE},
    lint::Linter,
    object::Meta,
    parser::{parse, parse_examples},
};

/// Builds a package image from a package backend and an optional examples
/// backend.
pub struct Builder {
    package: Box<dyn Backend>,
    examples: Option<Box<dyn Backend>>,
}

impl Builder {
    pub fn new(package: impl Backend + 'static, examples: Option<Box<dyn Backend>>) -> Self {
        Self {
            package: Box::new(package),
            examples,
        }
    }

    /// Parses, lints and layers the package.
    ///
    /// Returns the image together with the package meta.
    pub fn build(&self) -> XpkgResult<(Image, Meta)> {
        let raw = self.package.init().map_err(|source| {
            XpkgError::Backend {
                backend: "package",
                source,
            }
        })?;

        let mut package = parse(&raw)?;
        let linter = Linter::for_package(&package);
        linter.lint(&package)?;
        debug!(
            "package is a valid {} with {} objects",
            linter.package_type(),
            package.objects.len()
        );

        let base = layer(&raw, PACKAGE_FILE, BASE_ANNOTATION).map_err(|source| {
            XpkgError::Layer {
                layer: BASE_ANNOTATION,
                source,
            }
        })?;
        let mut image = append_annotated(Image::empty(), base);

        if let Some(examples) = &self.examples {
            match examples.init() {
                Ok(raw) => {
                    parse_examples(&raw).map_err(XpkgError::Examples)?;
                    let layer = layer(&raw, EXAMPLES_FILE, EXAMPLES_ANNOTATION).map_err(|source| {
                        XpkgError::Layer {
                            layer: EXAMPLES_ANNOTATION,
                            source,
                        }
                    })?;
                    image = append_annotated(image, layer);
                }
                Err(err) if err.is_not_found() => {
                    debug!("no examples found, building without them");
                }
                Err(source) => {
                    return Err(XpkgError::Backend {
                        backend: "examples",
                        source,
                    })
                }
            }
        }

        let meta = package.meta.pop().ok_or(LintError::MetaCount { found: 0 })?;
        info!("Built {} package {}", meta.package_type(), meta.name());
        Ok((image, meta))
    }
}

/// File name for a built package: `<meta-name>-<first 12 hex of digest>.xpkg`.
pub fn output_file_name(meta: &Meta, image: &Image) -> XpkgResult<String> {
    let digest = image.digest()?;
    let hex = digest.split_once(':').map_or(digest.as_str(), |(_, hex)| hex);
    let short = hex.get(..12).unwrap_or(hex);
    Ok(format!("{}-{short}.xpkg", meta.name()))
}
