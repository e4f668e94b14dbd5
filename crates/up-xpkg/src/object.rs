//! Typed package objects.
//!
//! Only the fields the tooling reads are typed; everything else is kept in
//! `extra` so objects serialize back without losing content.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

pub const META_API_GROUP: &str = "meta.pkg.crossplane.io";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Provider,
    Configuration,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Provider => "provider",
            PackageType::Configuration => "configuration",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "provider" => Ok(PackageType::Provider),
            "configuration" => Ok(PackageType::Configuration),
            other => Err(format!("unknown package type '{other}' (expected provider or configuration)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A Kubernetes-style object with a typed `spec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object<S> {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: S,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossplaneConstraints {
    pub version: String,
}

/// An entry of `spec.dependsOn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDependency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    #[serde(default)]
    pub version: String,
}

impl MetaDependency {
    pub fn package(&self) -> Option<(&str, PackageType)> {
        match (&self.provider, &self.configuration) {
            (Some(pkg), _) => Some((pkg, PackageType::Provider)),
            (None, Some(pkg)) => Some((pkg, PackageType::Configuration)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossplane: Option<CrossplaneConstraints>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<MetaDependency>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

pub type PackageMeta = Object<MetaSpec>;

/// The package's `crossplane.yaml` object.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    Provider(PackageMeta),
    Configuration(PackageMeta),
}

impl Meta {
    pub fn inner(&self) -> &PackageMeta {
        match self {
            Meta::Provider(meta) | Meta::Configuration(meta) => meta,
        }
    }

    pub fn package_type(&self) -> PackageType {
        match self {
            Meta::Provider(_) => PackageType::Provider,
            Meta::Configuration(_) => PackageType::Configuration,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner().metadata.name
    }

    pub fn crossplane_constraint(&self) -> Option<&str> {
        self.inner()
            .spec
            .crossplane
            .as_ref()
            .map(|c| c.version.as_str())
    }

    pub fn depends_on(&self) -> &[MetaDependency] {
        &self.inner().spec.depends_on
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Names {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSpec {
    pub group: String,
    pub names: Names,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    pub api_version: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSpec {
    pub composite_type_ref: TypeReference,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

pub type CustomResourceDefinition = Object<DefinitionSpec>;
pub type CompositeResourceDefinition = Object<DefinitionSpec>;
pub type Composition = Object<CompositionSpec>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfiguration {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Every non-meta object a package may carry.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageObject {
    CustomResourceDefinition(CustomResourceDefinition),
    CompositeResourceDefinition(CompositeResourceDefinition),
    Composition(Composition),
    MutatingWebhookConfiguration(WebhookConfiguration),
    ValidatingWebhookConfiguration(WebhookConfiguration),
}

impl PackageObject {
    pub fn kind(&self) -> &'static str {
        match self {
            PackageObject::CustomResourceDefinition(_) => "CustomResourceDefinition",
            PackageObject::CompositeResourceDefinition(_) => "CompositeResourceDefinition",
            PackageObject::Composition(_) => "Composition",
            PackageObject::MutatingWebhookConfiguration(_) => "MutatingWebhookConfiguration",
            PackageObject::ValidatingWebhookConfiguration(_) => "ValidatingWebhookConfiguration",
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            PackageObject::CustomResourceDefinition(o)
            | PackageObject::CompositeResourceDefinition(o) => &o.metadata,
            PackageObject::Composition(o) => &o.metadata,
            PackageObject::MutatingWebhookConfiguration(o)
            | PackageObject::ValidatingWebhookConfiguration(o) => &o.metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Renders the object as a single YAML document.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        match self {
            PackageObject::CustomResourceDefinition(o)
            | PackageObject::CompositeResourceDefinition(o) => serde_yaml::to_string(o),
            PackageObject::Composition(o) => serde_yaml::to_string(o),
            PackageObject::MutatingWebhookConfiguration(o)
            | PackageObject::ValidatingWebhookConfiguration(o) => serde_yaml::to_string(o),
        }
    }
}

impl Meta {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self.inner())
    }
}
