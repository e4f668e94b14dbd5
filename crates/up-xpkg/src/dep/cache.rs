//! Filesystem cache of fetched dependency packages.
//!
//! ```text
//! <root>/<registry>/<repository>@<tag>/
//!     crossplane.yaml      package meta
//!     <object-name>.yaml   one file per CRD, XRD, Composition or webhook
//!     sha256:<hex>         empty marker named after the image digest
//! ```
//!
//! Access within a process is serialised by a read-write lock. Separate
//! processes sharing a cache root are not coordinated.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use tracing::{debug, info};
use up_oci::{Image, ImageReference};
use up_utils::{
    fs::{ensure_dir_exists, read_dir_sorted, read_file, safe_remove, write_file},
    hash::is_sha256_digest,
};

use crate::{
    dep::Dependency,
    error::CacheError,
    layer::read_package_stream,
    object::{Meta, PackageObject, PackageType},
    parser::{parse, Package},
};

pub const META_FILE: &str = "crossplane.yaml";

/// A cached package, decoded from its entry directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPackage {
    pub registry: String,
    pub repository: String,
    pub version: String,
    pub digest: String,
    pub meta: Meta,
    pub objects: Vec<PackageObject>,
    pub dependencies: Vec<Dependency>,
}

impl ParsedPackage {
    fn new(reference: &ImageReference, digest: String, package: Package) -> Result<Self, String> {
        let mut metas = package.meta.into_iter();
        let meta = match (metas.next(), metas.next()) {
            (Some(meta), None) => meta,
            (None, _) => return Err("no package meta".to_string()),
            (Some(_), Some(_)) => return Err("more than one package meta".to_string()),
        };
        let dependencies = meta
            .depends_on()
            .iter()
            .filter_map(Dependency::from_meta)
            .collect();

        Ok(Self {
            registry: reference.registry.clone(),
            repository: reference.repository.clone(),
            version: reference.reference().to_string(),
            digest,
            meta,
            objects: package.objects,
            dependencies,
        })
    }

    pub fn package_type(&self) -> PackageType {
        self.meta.package_type()
    }
}

pub struct LocalCache {
    root: PathBuf,
    lock: RwLock<()>,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key(reference: &ImageReference) -> String {
        format!(
            "{}/{}@{}",
            reference.registry,
            reference.repository,
            reference.reference()
        )
    }

    fn entry_dir(&self, reference: &ImageReference) -> PathBuf {
        self.root.join(Self::key(reference))
    }

    /// Reads the entry for `reference`.
    ///
    /// A missing entry is reported as [`CacheError::NotFound`].
    pub fn get(&self, reference: &ImageReference) -> Result<ParsedPackage, CacheError> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let dir = self.entry_dir(reference);

        let files = match read_dir_sorted(&dir) {
            Ok(files) => files,
            Err(err) if err.is_not_found() => {
                return Err(CacheError::NotFound {
                    key: Self::key(reference),
                })
            }
            Err(err) => return Err(err.into()),
        };

        let invalid = |reason: &str| {
            CacheError::InvalidEntry {
                path: dir.clone(),
                reason: reason.to_string(),
            }
        };

        let mut digest = None;
        let mut stream = Vec::new();
        let mut has_meta = false;

        for path in &files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if is_sha256_digest(name) {
                if digest.replace(name.to_string()).is_some() {
                    return Err(invalid("more than one digest marker"));
                }
            } else if name.ends_with(".yaml") {
                has_meta |= name == META_FILE;
                if !stream.is_empty() {
                    stream.extend_from_slice(b"\n---\n");
                }
                stream.extend_from_slice(&read_file(path)?);
            }
        }

        if !has_meta {
            return Err(invalid("missing crossplane.yaml"));
        }
        let digest = digest.ok_or_else(|| invalid("missing digest marker"))?;
        let package = parse(&stream)?;

        debug!("cache hit for {}", Self::key(reference));
        ParsedPackage::new(reference, digest, package).map_err(|reason| invalid(&reason))
    }

    /// Replaces the entry for `reference` with the package in `image`.
    ///
    /// An entry already holding the same digest is left untouched.
    pub fn store(&self, reference: &ImageReference, image: &Image) -> Result<ParsedPackage, CacheError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let dir = self.entry_dir(reference);
        let invalid = |reason: String| {
            CacheError::InvalidEntry {
                path: dir.clone(),
                reason,
            }
        };

        let stream = read_package_stream(image)?.ok_or(CacheError::MissingBaseLayer)?;
        let digest = image.digest()?;
        let parsed = ParsedPackage::new(reference, digest.clone(), parse(&stream)?).map_err(invalid)?;
        let files = object_file_names(&parsed.objects).map_err(invalid)?;

        if stored_digest(&dir).as_deref() == Some(digest.as_str()) {
            debug!("{} already holds {}", Self::key(reference), digest);
            return Ok(parsed);
        }

        safe_remove(&dir)?;
        ensure_dir_exists(&dir)?;

        write_file(dir.join(META_FILE), parsed.meta.to_yaml()?.as_bytes())?;
        for (object, file) in parsed.objects.iter().zip(&files) {
            write_file(dir.join(file), object.to_yaml()?.as_bytes())?;
        }
        write_file(dir.join(&digest), &[])?;

        info!("Cached {} ({})", Self::key(reference), digest);
        Ok(parsed)
    }

    /// Removes the entry for `reference`; a missing entry is not an error.
    pub fn delete(&self, reference: &ImageReference) -> Result<(), CacheError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        safe_remove(self.entry_dir(reference))?;
        Ok(())
    }

    /// Tags cached for the package named by `reference`, in lexical order.
    pub fn versions(&self, reference: &ImageReference) -> Result<Vec<String>, CacheError> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);

        let package_dir = self.root.join(&reference.registry).join(&reference.repository);
        let (Some(parent), Some(base)) = (
            package_dir.parent(),
            package_dir.file_name().and_then(|n| n.to_str()),
        ) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{base}@");

        let entries = match read_dir_sorted(parent) {
            Ok(entries) => entries,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        Ok(entries
            .iter()
            .filter(|path| path.is_dir())
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()))
            .filter_map(|name| name.strip_prefix(&prefix))
            .map(str::to_string)
            .collect())
    }

    /// Removes the whole cache.
    pub fn clean(&self) -> Result<(), CacheError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        safe_remove(&self.root)?;
        info!("Removed package cache at {}", self.root.display());
        Ok(())
    }
}

/// Digest of a complete entry: one marker next to the meta file.
fn stored_digest(dir: &Path) -> Option<String> {
    if !dir.join(META_FILE).is_file() {
        return None;
    }
    let files = read_dir_sorted(dir).ok()?;
    let mut markers = files
        .iter()
        .filter_map(|path| path.file_name().and_then(|n| n.to_str()))
        .filter(|name| is_sha256_digest(name));
    match (markers.next(), markers.next()) {
        (Some(marker), None) => Some(marker.to_string()),
        _ => None,
    }
}

/// Object names come from fetched packages and must stay inside the entry.
fn check_object_name(name: &str) -> Result<(), String> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(format!("object name '{name}' cannot be used as a file name"));
    }
    Ok(())
}

/// File names for `objects`: `<name>.yaml`, then `<name>.<kind>.yaml`, then
/// `<name>.<kind>.<n>.yaml` while names collide.
fn object_file_names(objects: &[PackageObject]) -> Result<Vec<String>, String> {
    let mut used = HashSet::from([META_FILE.to_string()]);
    let mut names = Vec::with_capacity(objects.len());

    for object in objects {
        let name = object.name();
        check_object_name(name)?;
        let kind = object.kind().to_ascii_lowercase();

        let mut file = format!("{name}.yaml");
        let mut n = 1;
        while used.contains(&file) {
            file = if n == 1 {
                format!("{name}.{kind}.yaml")
            } else {
                format!("{name}.{kind}.{n}.yaml")
            };
            n += 1;
        }
        used.insert(file.clone());
        names.push(file);
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::layer::{append_annotated, layer, BASE_ANNOTATION, PACKAGE_FILE};

    const PACKAGE: &str = "apiVersion: meta.pkg.crossplane.io/v1
kind: Configuration
metadata:
  name: platform
spec:
  dependsOn:
    - provider: xpkg.upbound.io/org/provider-aws
      version: \">=v1.0.0\"
---
apiVersion: apiextensions.crossplane.io/v1
kind: CompositeResourceDefinition
metadata:
  name: xclusters.example.org
spec:
  group: example.org
  names:
    kind: XCluster
---
apiVersion: apiextensions.crossplane.io/v1
kind: Composition
metadata:
  name: cluster-aws
spec:
  compositeTypeRef:
    apiVersion: example.org/v1
    kind: XCluster
";

    fn image(stream: &str) -> Image {
        append_annotated(
            Image::empty(),
            layer(stream.as_bytes(), PACKAGE_FILE, BASE_ANNOTATION).unwrap(),
        )
    }

    fn reference(tag: &str) -> ImageReference {
        ImageReference::parse(&format!("xpkg.upbound.io/org/platform:{tag}")).unwrap()
    }

    fn markers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| is_sha256_digest(n))
            .collect()
    }

    #[test]
    fn test_store_then_get() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        let image = image(PACKAGE);
        let reference = reference("v1.0.0");

        cache.store(&reference, &image).unwrap();
        let entry = cache.get(&reference).unwrap();

        assert_eq!(entry.digest, image.digest().unwrap());
        assert_eq!(entry.version, "v1.0.0");
        assert_eq!(entry.registry, "xpkg.upbound.io");
        assert_eq!(entry.package_type(), PackageType::Configuration);
        assert_eq!(entry.meta.name(), "platform");
        assert_eq!(entry.objects.len(), 2);
        assert_eq!(entry.dependencies.len(), 1);
        assert_eq!(entry.dependencies[0].constraint, ">=v1.0.0");

        let entry_dir = dir.path().join("xpkg.upbound.io/org/platform@v1.0.0");
        assert!(entry_dir.join("crossplane.yaml").is_file());
        assert!(entry_dir.join("xclusters.example.org.yaml").is_file());
        assert!(entry_dir.join("cluster-aws.yaml").is_file());
        let marker = entry_dir.join(image.digest().unwrap());
        assert_eq!(fs::metadata(marker).unwrap().len(), 0);
    }

    #[test]
    fn test_second_store_leaves_one_marker() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        let reference = reference("v1.0.0");

        cache.store(&reference, &image(PACKAGE)).unwrap();
        let updated = image(&PACKAGE.replace("cluster-aws", "cluster-gcp"));
        cache.store(&reference, &updated).unwrap();

        let entry_dir = dir.path().join("xpkg.upbound.io/org/platform@v1.0.0");
        assert_eq!(markers(&entry_dir), vec![updated.digest().unwrap()]);
        assert!(!entry_dir.join("cluster-aws.yaml").exists());
        assert_eq!(cache.get(&reference).unwrap().digest, updated.digest().unwrap());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        let err = cache.get(&reference("v9.9.9")).unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[test]
    fn test_store_without_base_layer() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        let err = cache.store(&reference("v1.0.0"), &Image::empty()).unwrap_err();
        assert!(matches!(err, CacheError::MissingBaseLayer));
    }

    #[test]
    fn test_versions_and_delete() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        cache.store(&reference("v1.0.0"), &image(PACKAGE)).unwrap();
        cache.store(&reference("v1.1.0"), &image(PACKAGE)).unwrap();

        let name = ImageReference::parse("xpkg.upbound.io/org/platform").unwrap();
        assert_eq!(cache.versions(&name).unwrap(), vec!["v1.0.0", "v1.1.0"]);

        cache.delete(&reference("v1.0.0")).unwrap();
        cache.delete(&reference("v1.0.0")).unwrap();
        assert_eq!(cache.versions(&name).unwrap(), vec!["v1.1.0"]);

        let other = ImageReference::parse("xpkg.upbound.io/other/pkg").unwrap();
        assert!(cache.versions(&other).unwrap().is_empty());
    }

    #[test]
    fn test_clean_removes_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        let cache = LocalCache::new(&root);
        cache.store(&reference("v1.0.0"), &image(PACKAGE)).unwrap();

        cache.clean().unwrap();
        assert!(!root.exists());
        assert!(cache.get(&reference("v1.0.0")).unwrap_err().to_string().contains("not in the cache"));
    }

    #[test]
    fn test_get_rejects_entry_without_marker() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        let reference = reference("v1.0.0");
        cache.store(&reference, &image(PACKAGE)).unwrap();

        let entry_dir = dir.path().join("xpkg.upbound.io/org/platform@v1.0.0");
        for marker in markers(&entry_dir) {
            fs::remove_file(entry_dir.join(marker)).unwrap();
        }
        assert!(matches!(
            cache.get(&reference),
            Err(CacheError::InvalidEntry { .. })
        ));
    }

    fn provider_with_crds(names: &[&str]) -> String {
        let mut stream = "apiVersion: meta.pkg.crossplane.io/v1\nkind: Provider\nmetadata:\n  name: provider-test\n".to_string();
        for name in names {
            stream.push_str(&format!(
                "---\napiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: \"{name}\"\nspec:\n  group: example.org\n  names:\n    kind: Thing\n"
            ));
        }
        stream
    }

    #[test]
    fn test_store_rejects_object_names_leaving_the_entry() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        let cache = LocalCache::new(&root);
        let reference = reference("v1.0.0");

        for name in ["../../../../escaped", "a/b", "..", ""] {
            let err = cache
                .store(&reference, &image(&provider_with_crds(&[name])))
                .unwrap_err();
            assert!(matches!(err, CacheError::InvalidEntry { .. }), "{name}");
        }
        assert!(!dir.path().join("escaped.yaml").exists());
        assert!(!root.join("xpkg.upbound.io/org/platform@v1.0.0").exists());
    }

    #[test]
    fn test_store_keeps_every_colliding_object() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        let reference = reference("v1.0.0");

        cache
            .store(&reference, &image(&provider_with_crds(&["same", "same", "same", "crossplane"])))
            .unwrap();

        let entry_dir = dir.path().join("xpkg.upbound.io/org/platform@v1.0.0");
        assert!(entry_dir.join("same.yaml").is_file());
        assert!(entry_dir.join("same.customresourcedefinition.yaml").is_file());
        assert!(entry_dir.join("same.customresourcedefinition.2.yaml").is_file());
        assert!(entry_dir.join("crossplane.customresourcedefinition.yaml").is_file());
        assert_eq!(cache.get(&reference).unwrap().objects.len(), 4);
    }

    #[test]
    fn test_store_same_digest_leaves_entry_alone() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        let reference = reference("v1.0.0");
        let image = image(PACKAGE);

        cache.store(&reference, &image).unwrap();
        let entry_dir = dir.path().join("xpkg.upbound.io/org/platform@v1.0.0");
        fs::write(entry_dir.join("untouched"), b"").unwrap();

        let entry = cache.store(&reference, &image).unwrap();
        assert_eq!(entry.digest, image.digest().unwrap());
        assert!(entry_dir.join("untouched").exists());
        assert_eq!(markers(&entry_dir), vec![image.digest().unwrap()]);
    }
}
