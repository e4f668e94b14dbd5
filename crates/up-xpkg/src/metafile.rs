//! Edits to a package's `crossplane.yaml`.
//!
//! The file is rewritten from its parsed YAML, so comments and formatting
//! are not preserved.

use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::debug;
use up_oci::ImageReference;
use up_utils::fs::{read_file, write_file};

use crate::{
    dep::Dependency,
    error::{XpkgError, XpkgResult},
};

/// Inserts `dep` into `spec.dependsOn` of the meta file at `path`, replacing
/// any entry for the same package.
///
/// Packages are compared by registry and repository, with
/// `default_registry` filled in where an entry names none.
pub fn upsert_dependency(path: &Path, dep: &Dependency, default_registry: &str) -> XpkgResult<()> {
    let wrap = |source: XpkgError| {
        XpkgError::MetaFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    };

    let content = read_file(path).map_err(|err| wrap(err.into()))?;
    let updated = upsert(&content, dep, default_registry).map_err(wrap)?;
    write_file(path, updated.as_bytes()).map_err(|err| wrap(err.into()))?;

    debug!("updated {} with {dep}", path.display());
    Ok(())
}

/// `registry/repository` of `package`, or the string itself when it is not a
/// valid reference.
fn package_name(package: &str, default_registry: &str) -> String {
    ImageReference::parse_with_registry(package, default_registry)
        .map(|reference| reference.name())
        .unwrap_or_else(|_| package.to_string())
}

fn upsert(content: &[u8], dep: &Dependency, default_registry: &str) -> XpkgResult<String> {
    let mut doc: Value = serde_yaml::from_slice(content)?;
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| XpkgError::InvalidMetaFile("meta file is not an object".to_string()))?;

    let spec = child_mapping(root, "spec")?;
    let depends_on = spec
        .entry(Value::from("dependsOn"))
        .or_insert_with(|| Value::Sequence(Vec::new()))
        .as_sequence_mut()
        .ok_or_else(|| XpkgError::InvalidMetaFile("spec.dependsOn is not a list".to_string()))?;

    let entry = serde_yaml::to_value(dep.to_meta())?;
    let key = dep.package_type.as_str();
    let name = package_name(&dep.package, default_registry);
    let existing = depends_on.iter_mut().find(|item| {
        item.get(key)
            .and_then(Value::as_str)
            .is_some_and(|package| package_name(package, default_registry) == name)
    });

    match existing {
        Some(item) => *item = entry,
        None => depends_on.push(entry),
    }

    Ok(serde_yaml::to_string(&doc)?)
}

fn child_mapping<'a>(parent: &'a mut Mapping, key: &str) -> XpkgResult<&'a mut Mapping> {
    let value = parent
        .entry(Value::from(key))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if value.is_null() {
        *value = Value::Mapping(Mapping::new());
    }
    value
        .as_mapping_mut()
        .ok_or_else(|| XpkgError::InvalidMetaFile(format!("`{key}` is not an object")))
}
