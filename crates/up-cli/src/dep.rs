use std::path::Path;

use nu_ansi_term::Color::{Cyan, Green};
use serde::Serialize;
use tracing::{info, warn};
use up_xpkg::{
    dep::{cache::META_FILE, Dependency},
    metafile::upsert_dependency,
    object::PackageType,
};

use crate::{
    error::UpResult,
    progress::with_spinner,
    state::AppState,
    utils::{absolute_path, print_json, Colored},
};

#[derive(Serialize)]
struct AddOutput {
    package: String,
    package_type: String,
    version: String,
    digest: String,
    dependencies: Vec<String>,
}

#[derive(Serialize)]
struct ListOutput {
    package: String,
    versions: Vec<String>,
}

pub fn clean_cache(state: &AppState) -> UpResult<()> {
    state.cache().clean()?;
    Ok(())
}

pub fn add_dependency(
    state: &AppState,
    package: &str,
    package_type: PackageType,
    package_root: &str,
) -> UpResult<()> {
    let dep = Dependency::parse(package, package_type);
    let registry = dep.reference(state.default_registry())?.registry;
    let manager = state.manager(&registry);

    let (pinned, entry) = with_spinner(&format!("Resolving {dep}"), || manager.add(&dep))?;

    let meta_path = absolute_path(package_root)?.join(META_FILE);
    update_meta_file(&meta_path, &pinned, state.default_registry())?;

    let printed = print_json(&AddOutput {
        package: pinned.package.clone(),
        package_type: entry.package_type().to_string(),
        version: entry.version.clone(),
        digest: entry.digest.clone(),
        dependencies: entry.dependencies.iter().map(ToString::to_string).collect(),
    })?;
    if !printed {
        info!(
            "{} {} {}",
            Colored(Green, "Added"),
            Colored(Cyan, &pinned.package),
            entry.version
        );
        for transitive in &entry.dependencies {
            info!("  depends on {transitive}");
        }
    }

    Ok(())
}

fn update_meta_file(path: &Path, dep: &Dependency, default_registry: &str) -> UpResult<()> {
    if !path.exists() {
        warn!(
            "{} not found, the dependency was cached but not recorded",
            path.display()
        );
        return Ok(());
    }
    upsert_dependency(path, dep, default_registry)?;
    info!("Updated {}", path.display());
    Ok(())
}

pub fn list_versions(state: &AppState, package: &str) -> UpResult<()> {
    let dep = Dependency::parse(package, PackageType::Provider);
    let reference = dep.reference(state.default_registry())?;
    let versions = state.cache().versions(&reference)?;

    let printed = print_json(&ListOutput {
        package: reference.name(),
        versions: versions.clone(),
    })?;
    if printed {
        return Ok(());
    }

    if versions.is_empty() {
        info!("No cached versions of {}", reference.name());
    }
    for version in versions {
        info!("{}@{}", reference.name(), version);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_meta_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let dep = Dependency::new("org/provider", PackageType::Provider, "v1.0.0");
        update_meta_file(&dir.path().join(META_FILE), &dep, "xpkg.upbound.io").unwrap();
        assert!(!dir.path().join(META_FILE).exists());
    }

    #[test]
    fn test_meta_file_is_updated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(META_FILE);
        fs::write(
            &path,
            "apiVersion: meta.pkg.crossplane.io/v1\nkind: Configuration\nmetadata:\n  name: cfg\nspec: {}\n",
        )
        .unwrap();

        let dep = Dependency::new("org/provider", PackageType::Provider, "v1.0.0");
        update_meta_file(&path, &dep, "xpkg.upbound.io").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("provider: org/provider"));
        assert!(content.contains("version: v1.0.0"));
    }
}
