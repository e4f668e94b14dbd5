use tracing::{debug, info, warn};

use crate::{
    dep::{
        cache::{LocalCache, ParsedPackage},
        fetcher::Fetcher,
        resolver::Resolver,
        Dependency,
    },
    error::{CacheError, XpkgError, XpkgResult},
};

/// Resolves dependencies and keeps the local cache populated.
pub struct Manager<F: Fetcher> {
    cache: LocalCache,
    fetcher: F,
    default_registry: String,
}

impl<F: Fetcher> Manager<F> {
    pub fn new(cache: LocalCache, fetcher: F, default_registry: impl Into<String>) -> Self {
        Self {
            cache,
            fetcher,
            default_registry: default_registry.into(),
        }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Pins `dep` to the highest registry tag satisfying its constraint.
    pub fn resolve(&self, dep: &Dependency) -> XpkgResult<Dependency> {
        let tag = Resolver::new(&self.fetcher, &self.default_registry).resolve_tag(dep)?;
        debug!("resolved {dep} to {tag}");
        Ok(dep.pinned(tag))
    }

    /// Resolves `dep` and returns its cache entry.
    ///
    /// The package is fetched when it is not cached, when its entry is
    /// unreadable, or when the registry now serves a different digest for
    /// the resolved tag.
    pub fn add(&self, dep: &Dependency) -> XpkgResult<(Dependency, ParsedPackage)> {
        let pinned = self.resolve(dep)?;
        let reference = pinned
            .reference(&self.default_registry)?
            .with_tag(pinned.constraint.clone());
        let fetch_error = |source| {
            XpkgError::Fetch {
                reference: reference.to_string(),
                source,
            }
        };

        match self.cache.get(&reference) {
            Ok(entry) => {
                let current = self.fetcher.digest(&reference).map_err(fetch_error)?;
                if current == entry.digest {
                    info!("{reference} is already cached");
                    return Ok((pinned, entry));
                }
                info!("{reference} moved from {} to {current}", entry.digest);
            }
            Err(CacheError::NotFound { .. }) => {}
            Err(CacheError::InvalidEntry { path, reason }) => {
                warn!("Discarding cache entry {}: {reason}", path.display());
            }
            Err(err) => return Err(err.into()),
        }

        info!("Fetching {reference}");
        let image = self.fetcher.fetch(&reference).map_err(fetch_error)?;
        let entry = self.cache.store(&reference, &image)?;

        Ok((pinned, entry))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use up_oci::Image;

    use super::*;
    use crate::{
        dep::fetcher::testing::StaticFetcher,
        layer::{append_annotated, layer, BASE_ANNOTATION, PACKAGE_FILE},
        object::PackageType,
    };

    const PROVIDER: &str = "apiVersion: meta.pkg.crossplane.io/v1
kind: Provider
metadata:
  name: provider-aws
spec:
  controller:
    image: xpkg.upbound.io/org/provider-aws-controller:v1.1.0
";

    fn provider_image() -> Image {
        append_annotated(
            Image::empty(),
            layer(PROVIDER.as_bytes(), PACKAGE_FILE, BASE_ANNOTATION).unwrap(),
        )
    }

    fn manager(root: &std::path::Path) -> Manager<StaticFetcher> {
        let fetcher = StaticFetcher::with_tags(&["v1.0.0", "v1.1.0", "v2.0.0-rc.1"])
            .with_image("xpkg.upbound.io/org/provider-aws:v1.1.0", provider_image());
        Manager::new(LocalCache::new(root), fetcher, "xpkg.upbound.io")
    }

    #[test]
    fn test_add_fetches_once() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let dep = Dependency::new("org/provider-aws", PackageType::Provider, ">=v1.0.0");

        let (pinned, entry) = manager.add(&dep).unwrap();
        assert_eq!(pinned.constraint, "v1.1.0");
        assert_eq!(entry.version, "v1.1.0");
        assert_eq!(entry.package_type(), PackageType::Provider);
        assert_eq!(entry.digest, provider_image().digest().unwrap());
        assert_eq!(manager.fetcher.fetches.get(), 1);

        let (_, again) = manager.add(&dep).unwrap();
        assert_eq!(again.digest, entry.digest);
        assert_eq!(manager.fetcher.fetches.get(), 1);
        assert!(dir
            .path()
            .join("xpkg.upbound.io/org/provider-aws@v1.1.0")
            .is_dir());
    }

    #[test]
    fn test_add_fetch_failure() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let dep = Dependency::new("org/provider-aws", PackageType::Provider, "v1.0.0");

        let err = manager.add(&dep).unwrap_err();
        assert!(matches!(err, XpkgError::Fetch { .. }));
        assert!(manager.cache().versions(&dep.reference("xpkg.upbound.io").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_add_unresolvable() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let dep = Dependency::new("org/provider-aws", PackageType::Provider, ">=v3.0.0");
        assert!(matches!(manager.add(&dep), Err(XpkgError::Resolve(_))));
        assert_eq!(manager.fetcher.fetches.get(), 0);
    }

    #[test]
    fn test_add_refreshes_moved_tag() {
        let dir = tempdir().unwrap();
        let dep = Dependency::new("org/provider-aws", PackageType::Provider, "v1.1.0");
        let (_, first) = manager(dir.path()).add(&dep).unwrap();

        let repushed = append_annotated(
            Image::empty(),
            layer(
                PROVIDER.replace("controller:v1.1.0", "controller:v1.1.1").as_bytes(),
                PACKAGE_FILE,
                BASE_ANNOTATION,
            )
            .unwrap(),
        );
        let expected = repushed.digest().unwrap();
        assert_ne!(expected, first.digest);

        let fetcher = StaticFetcher::with_tags(&["v1.1.0"])
            .with_image("xpkg.upbound.io/org/provider-aws:v1.1.0", repushed);
        let manager = Manager::new(LocalCache::new(dir.path()), fetcher, "xpkg.upbound.io");

        let (_, second) = manager.add(&dep).unwrap();
        assert_eq!(second.digest, expected);
        assert_eq!(manager.fetcher.fetches.get(), 1);

        let reference = dep.reference("xpkg.upbound.io").unwrap().with_tag("v1.1.0");
        assert_eq!(manager.cache().get(&reference).unwrap().digest, expected);
    }

    #[test]
    fn test_add_replaces_broken_entry() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let dep = Dependency::new("org/provider-aws", PackageType::Provider, "v1.1.0");
        let (_, entry) = manager.add(&dep).unwrap();

        let entry_dir = dir.path().join("xpkg.upbound.io/org/provider-aws@v1.1.0");
        std::fs::remove_file(entry_dir.join(&entry.digest)).unwrap();

        let (_, repaired) = manager.add(&dep).unwrap();
        assert_eq!(repaired.digest, entry.digest);
        assert_eq!(manager.fetcher.fetches.get(), 2);
        assert!(entry_dir.join(&entry.digest).is_file());
    }
}
