//! Package validation rules.

use crate::{
    dep::constraint::Constraint,
    error::LintError,
    object::{Meta, PackageObject, PackageType},
    parser::Package,
};

/// Rule set for one package type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linter {
    package_type: PackageType,
}

impl Linter {
    pub fn provider() -> Self {
        Self {
            package_type: PackageType::Provider,
        }
    }

    pub fn configuration() -> Self {
        Self {
            package_type: PackageType::Configuration,
        }
    }

    /// Provider rules for a package whose single meta is a Provider,
    /// Configuration rules otherwise.
    pub fn for_package(package: &Package) -> Self {
        match package.meta.as_slice() {
            [Meta::Provider(_)] => Self::provider(),
            _ => Self::configuration(),
        }
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    /// Runs every rule in order and returns the first failure.
    pub fn lint(&self, package: &Package) -> Result<(), LintError> {
        let meta = one_meta(package)?;
        self.meta_type(meta)?;
        crossplane_version(meta)?;
        dependency_versions(meta)?;
        for object in &package.objects {
            self.object_kind(object)?;
        }
        Ok(())
    }

    fn meta_type(&self, meta: &Meta) -> Result<(), LintError> {
        let found = meta.package_type();
        if found == self.package_type {
            return Ok(());
        }
        Err(LintError::MetaType {
            expected: kind_name(self.package_type),
            found: kind_name(found),
        })
    }

    fn object_kind(&self, object: &PackageObject) -> Result<(), LintError> {
        let allowed = match self.package_type {
            PackageType::Provider => {
                matches!(
                    object,
                    PackageObject::CustomResourceDefinition(_)
                        | PackageObject::MutatingWebhookConfiguration(_)
                        | PackageObject::ValidatingWebhookConfiguration(_)
                )
            }
            PackageType::Configuration => {
                matches!(
                    object,
                    PackageObject::CompositeResourceDefinition(_) | PackageObject::Composition(_)
                )
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(LintError::ObjectKind {
                kind: object.kind(),
                name: object.name().to_string(),
                package_type: self.package_type.as_str(),
            })
        }
    }
}

fn kind_name(package_type: PackageType) -> &'static str {
    match package_type {
        PackageType::Provider => "Provider",
        PackageType::Configuration => "Configuration",
    }
}

fn one_meta(package: &Package) -> Result<&Meta, LintError> {
    match package.meta.as_slice() {
        [meta] => Ok(meta),
        metas => {
            Err(LintError::MetaCount {
                found: metas.len(),
            })
        }
    }
}

fn crossplane_version(meta: &Meta) -> Result<(), LintError> {
    let Some(constraint) = meta.crossplane_constraint() else {
        return Ok(());
    };
    Constraint::parse(constraint)
        .map(|_| ())
        .map_err(|reason| {
            LintError::CrossplaneConstraint {
                constraint: constraint.to_string(),
                reason,
            }
        })
}

fn dependency_versions(meta: &Meta) -> Result<(), LintError> {
    for (index, dep) in meta.depends_on().iter().enumerate() {
        let (package, _) = dep
            .package()
            .ok_or(LintError::DependencyPackage { index })?;
        Constraint::parse(&dep.version).map_err(|reason| {
            LintError::DependencyConstraint {
                package: package.to_string(),
                constraint: dep.version.clone(),
                reason,
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const PROVIDER: &str = "apiVersion: meta.pkg.crossplane.io/v1\nkind: Provider\nmetadata:\n  name: provider-test\n";
    const CONFIGURATION: &str = "apiVersion: meta.pkg.crossplane.io/v1\nkind: Configuration\nmetadata:\n  name: cfg\n";
    const CRD: &str = "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: things.example.org\nspec:\n  group: example.org\n  names:\n    kind: Thing\n";
    const XRD: &str = "apiVersion: apiextensions.crossplane.io/v1\nkind: CompositeResourceDefinition\nmetadata:\n  name: xthings.example.org\nspec:\n  group: example.org\n  names:\n    kind: XThing\n";

    fn package(docs: &[&str]) -> Package {
        parse(docs.join("---\n").as_bytes()).unwrap()
    }

    #[test]
    fn test_valid_provider() {
        let pkg = package(&[PROVIDER, CRD]);
        assert_eq!(Linter::for_package(&pkg), Linter::provider());
        assert_eq!(Linter::provider().lint(&pkg), Ok(()));
    }

    #[test]
    fn test_valid_configuration() {
        let pkg = package(&[CONFIGURATION, XRD]);
        assert_eq!(Linter::for_package(&pkg), Linter::configuration());
        assert_eq!(Linter::configuration().lint(&pkg), Ok(()));
    }

    #[test]
    fn test_zero_meta() {
        let pkg = package(&[CRD]);
        assert_eq!(
            Linter::provider().lint(&pkg),
            Err(LintError::MetaCount { found: 0 })
        );
    }

    #[test]
    fn test_two_meta() {
        let pkg = package(&[PROVIDER, PROVIDER]);
        assert_eq!(
            Linter::provider().lint(&pkg),
            Err(LintError::MetaCount { found: 2 })
        );
    }

    #[test]
    fn test_wrong_meta_type() {
        let pkg = package(&[CONFIGURATION]);
        assert_eq!(
            Linter::provider().lint(&pkg),
            Err(LintError::MetaType {
                expected: "Provider",
                found: "Configuration",
            })
        );
    }

    #[test]
    fn test_invalid_crossplane_constraint() {
        let meta = format!("{PROVIDER}spec:\n  crossplane:\n    version: \">=not-a-version\"\n");
        let pkg = package(&[&meta]);
        assert!(matches!(
            Linter::provider().lint(&pkg),
            Err(LintError::CrossplaneConstraint { .. })
        ));
    }

    #[test]
    fn test_valid_crossplane_constraint() {
        let meta = format!("{CONFIGURATION}spec:\n  crossplane:\n    version: \">=v1.14.0-0\"\n");
        let pkg = package(&[&meta]);
        assert_eq!(Linter::configuration().lint(&pkg), Ok(()));
    }

    #[test]
    fn test_invalid_dependency_constraint() {
        let meta = format!(
            "{CONFIGURATION}spec:\n  dependsOn:\n    - provider: xpkg.upbound.io/org/provider\n      version: \"~~1\"\n"
        );
        let pkg = package(&[&meta]);
        assert!(matches!(
            Linter::configuration().lint(&pkg),
            Err(LintError::DependencyConstraint { .. })
        ));
    }

    #[test]
    fn test_object_not_allowed() {
        let pkg = package(&[PROVIDER, XRD]);
        assert_eq!(
            Linter::provider().lint(&pkg),
            Err(LintError::ObjectKind {
                kind: "CompositeResourceDefinition",
                name: "xthings.example.org".to_string(),
                package_type: "provider",
            })
        );

        let pkg = package(&[CONFIGURATION, CRD]);
        assert!(matches!(
            Linter::configuration().lint(&pkg),
            Err(LintError::ObjectKind { .. })
        ));
    }

    #[test]
    fn test_first_failure_wins() {
        let pkg = package(&[CRD, XRD]);
        assert_eq!(
            Linter::provider().lint(&pkg),
            Err(LintError::MetaCount { found: 0 })
        );
    }
}
