use std::path::{Path, PathBuf};

use nu_ansi_term::Color::Cyan;
use serde::Serialize;
use tracing::{debug, info};
use up_oci::{registry::RegistryClient, tarball, ImageReference};
use up_utils::fs::read_dir_sorted;
use up_xpkg::layer::annotate_image;

use crate::{
    error::{UpError, UpResult},
    progress::with_spinner,
    state::AppState,
    utils::{absolute_path, display_name, print_json, Colored},
};

#[derive(Serialize)]
struct PushOutput {
    reference: String,
    digest: String,
}

/// The single `.xpkg` file in `dir`.
fn find_package_file(dir: &Path) -> UpResult<PathBuf> {
    let mut found: Vec<PathBuf> = read_dir_sorted(dir)?
        .into_iter()
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "xpkg"))
        .collect();

    match found.len() {
        0 => Err(UpError::NoPackageFile(dir.to_path_buf())),
        1 => Ok(found.remove(0)),
        _ => {
            Err(UpError::MultiplePackageFiles {
                dir: dir.to_path_buf(),
                files: found.iter().map(|path| display_name(path)).collect(),
            })
        }
    }
}

pub fn push_package(state: &AppState, tag: &str, package: Option<&str>) -> UpResult<()> {
    let reference = ImageReference::parse_with_registry(tag, state.default_registry())?;
    if reference.tag.is_none() {
        return Err(UpError::MissingTag(tag.to_string()));
    }

    let path = match package {
        Some(path) => absolute_path(path)?,
        None => find_package_file(&absolute_path(".")?)?,
    };
    debug!("pushing {} to {reference}", path.display());

    let image = annotate_image(tarball::read(&path)?)?;
    let client = RegistryClient::new(state.credentials(&reference.registry));
    let digest = with_spinner(&format!("Pushing {}", display_name(&path)), || {
        client.push(&reference, &image)
    })?;

    let printed = print_json(&PushOutput {
        reference: reference.to_string(),
        digest: digest.clone(),
    })?;
    if !printed {
        info!("Pushed {} ({digest})", Colored(Cyan, &reference));
    }

    Ok(())
}
