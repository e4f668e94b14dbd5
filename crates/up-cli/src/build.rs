use std::path::PathBuf;

use nu_ansi_term::Color::Cyan;
use serde::Serialize;
use tracing::info;
use up_oci::tarball;
use up_xpkg::{
    backend::{Backend, FsBackend},
    build::{output_file_name, Builder},
};

use crate::{
    error::UpResult,
    progress::with_spinner,
    utils::{absolute_path, display_name, print_json, Colored},
};

#[derive(Serialize)]
struct BuildOutput {
    name: String,
    package_type: String,
    digest: String,
    path: PathBuf,
}

pub fn build_package(
    package_root: &str,
    examples_root: Option<&str>,
    ignore: &[String],
    output: Option<&str>,
) -> UpResult<()> {
    let package_root = absolute_path(package_root)?;
    let examples_root = match examples_root {
        Some(dir) => absolute_path(dir)?,
        None => package_root.join("examples"),
    };

    let package = ignore.iter().fold(
        FsBackend::new(&package_root).skip(&examples_root),
        |backend, pattern| backend.ignore(pattern.as_str()),
    );
    let examples: Box<dyn Backend> = Box::new(FsBackend::new(&examples_root));
    let builder = Builder::new(package, Some(examples));

    let (image, meta) = with_spinner("Building package", || builder.build())?;

    let path = match output {
        Some(path) => absolute_path(path)?,
        None => package_root.join(output_file_name(&meta, &image)?),
    };
    tarball::write(&path, &image, &[])?;

    let digest = image.digest()?;
    let printed = print_json(&BuildOutput {
        name: meta.name().to_string(),
        package_type: meta.package_type().to_string(),
        digest: digest.clone(),
        path: path.clone(),
    })?;
    if !printed {
        info!(
            "Built {} {} to {} ({})",
            meta.package_type(),
            Colored(Cyan, meta.name()),
            display_name(&path),
            digest
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;
    use up_xpkg::layer::{find_layer, EXAMPLES_ANNOTATION};

    use super::*;

    const PROVIDER: &str = "apiVersion: meta.pkg.crossplane.io/v1
kind: Provider
metadata:
  name: provider-nop
spec:
  controller:
    image: xpkg.upbound.io/org/provider-nop-controller:v0.1.0
";

    #[test]
    fn test_build_writes_tarball() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("examples")).unwrap();
        fs::write(dir.path().join("crossplane.yaml"), PROVIDER).unwrap();
        fs::write(dir.path().join("draft.yaml"), "not: [valid").unwrap();
        fs::write(
            dir.path().join("examples/nop.yaml"),
            "apiVersion: nop.example.org/v1\nkind: NopResource\nmetadata:\n  name: ex\n",
        )
        .unwrap();

        let output = dir.path().join("out.xpkg");
        build_package(
            dir.path().to_str().unwrap(),
            None,
            &["draft.yaml".to_string()],
            Some(output.to_str().unwrap()),
        )
        .unwrap();

        let image = tarball::read(&output).unwrap();
        assert_eq!(image.layers().len(), 2);
        assert!(find_layer(&image, EXAMPLES_ANNOTATION).is_some());
    }

    #[test]
    fn test_build_default_output_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("crossplane.yaml"), PROVIDER).unwrap();

        build_package(dir.path().to_str().unwrap(), None, &[], None).unwrap();

        let built: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".xpkg"))
            .collect();
        assert_eq!(built.len(), 1);
        assert!(built[0].starts_with("provider-nop-"));
    }
}
