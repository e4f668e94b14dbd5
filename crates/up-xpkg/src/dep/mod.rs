//! Package dependencies: model, version resolution, local cache and the
//! manager tying them together.

pub mod cache;
pub mod constraint;
pub mod fetcher;
pub mod manager;
pub mod resolver;

use std::fmt;

use up_oci::{ImageReference, OciError};

use crate::object::{MetaDependency, PackageType};

/// A package this package depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub package: String,
    pub package_type: PackageType,
    pub constraint: String,
}

impl Dependency {
    pub fn new(
        package: impl Into<String>,
        package_type: PackageType,
        constraint: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            package_type,
            constraint: constraint.into(),
        }
    }

    /// Parses CLI input of the form `package[@constraint]` or
    /// `package[:constraint]`.
    ///
    /// A colon only separates the constraint when it follows the last `/`, so
    /// registry ports are kept.
    pub fn parse(input: &str, package_type: PackageType) -> Self {
        let input = input.trim();

        if let Some((package, constraint)) = input.split_once('@') {
            return Self::new(package, package_type, constraint);
        }

        let last_slash = input.rfind('/').map_or(0, |i| i + 1);
        match input[last_slash..].find(':') {
            Some(pos) => {
                let split = last_slash + pos;
                Self::new(&input[..split], package_type, &input[split + 1..])
            }
            None => Self::new(input, package_type, ""),
        }
    }

    /// Returns the `spec.dependsOn` entries of a meta object as dependencies.
    pub fn from_meta(dep: &MetaDependency) -> Option<Self> {
        let (package, package_type) = dep.package()?;
        Some(Self::new(package, package_type, dep.version.clone()))
    }

    pub fn to_meta(&self) -> MetaDependency {
        let (provider, configuration) = match self.package_type {
            PackageType::Provider => (Some(self.package.clone()), None),
            PackageType::Configuration => (None, Some(self.package.clone())),
        };
        MetaDependency {
            provider,
            configuration,
            version: self.constraint.clone(),
        }
    }

    /// The package reference without a tag.
    pub fn reference(&self, default_registry: &str) -> Result<ImageReference, OciError> {
        ImageReference::parse_with_registry(&self.package, default_registry)
    }

    /// A copy pinned to an exact resolved tag.
    pub fn pinned(&self, tag: impl Into<String>) -> Self {
        Self {
            constraint: tag.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.package, self.constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_at_separator() {
        let dep = Dependency::parse("crossplane/provider-aws@>=v0.20.0", PackageType::Provider);
        assert_eq!(dep.package, "crossplane/provider-aws");
        assert_eq!(dep.constraint, ">=v0.20.0");
        assert_eq!(dep.to_string(), "crossplane/provider-aws@>=v0.20.0");
    }

    #[test]
    fn test_parse_colon_separator_keeps_port() {
        let dep = Dependency::parse("localhost:5000/org/cfg:v1.0.0", PackageType::Configuration);
        assert_eq!(dep.package, "localhost:5000/org/cfg");
        assert_eq!(dep.constraint, "v1.0.0");

        let dep = Dependency::parse("localhost:5000/org/cfg", PackageType::Configuration);
        assert_eq!(dep.package, "localhost:5000/org/cfg");
        assert_eq!(dep.constraint, "");
    }

    #[test]
    fn test_meta_roundtrip() {
        let dep = Dependency::new("xpkg.upbound.io/org/provider", PackageType::Provider, "v1.0.0");
        let meta = dep.to_meta();
        assert_eq!(meta.provider.as_deref(), Some("xpkg.upbound.io/org/provider"));
        assert!(meta.configuration.is_none());
        assert_eq!(Dependency::from_meta(&meta), Some(dep));
    }

    #[test]
    fn test_reference_uses_default_registry() {
        let dep = Dependency::new("org/provider", PackageType::Provider, "");
        let reference = dep.reference("registry.example.com").unwrap();
        assert_eq!(reference.name(), "registry.example.com/org/provider");
    }

    #[test]
    fn test_pinned() {
        let dep = Dependency::new("org/provider", PackageType::Provider, ">=v1.0.0");
        assert_eq!(dep.pinned("v1.2.0").constraint, "v1.2.0");
    }
}
