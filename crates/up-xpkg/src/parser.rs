//! Decodes package YAML streams into typed objects.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::{
    error::ParseError,
    object::{Meta, PackageObject},
};

/// Objects decoded from a package stream, split into meta and everything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Package {
    pub meta: Vec<Meta>,
    pub objects: Vec<PackageObject>,
}

enum Decoded {
    Meta(Meta),
    Object(PackageObject),
}

type Decoder = fn(Value) -> Result<Decoded, serde_yaml::Error>;

/// Meta objects may omit `spec`.
fn with_spec(mut v: Value) -> Value {
    if let Value::Mapping(mapping) = &mut v {
        if matches!(mapping.get("spec"), None | Some(Value::Null)) {
            mapping.insert(Value::from("spec"), Value::Mapping(Mapping::new()));
        }
    }
    v
}

fn provider(v: Value) -> Result<Decoded, serde_yaml::Error> {
    Ok(Decoded::Meta(Meta::Provider(serde_yaml::from_value(with_spec(v))?)))
}

fn configuration(v: Value) -> Result<Decoded, serde_yaml::Error> {
    Ok(Decoded::Meta(Meta::Configuration(serde_yaml::from_value(with_spec(v))?)))
}

fn crd(v: Value) -> Result<Decoded, serde_yaml::Error> {
    let crd = serde_yaml::from_value(v)?;
    Ok(Decoded::Object(PackageObject::CustomResourceDefinition(crd)))
}

fn xrd(v: Value) -> Result<Decoded, serde_yaml::Error> {
    let xrd = serde_yaml::from_value(v)?;
    Ok(Decoded::Object(PackageObject::CompositeResourceDefinition(xrd)))
}

fn composition(v: Value) -> Result<Decoded, serde_yaml::Error> {
    let comp = serde_yaml::from_value(v)?;
    Ok(Decoded::Object(PackageObject::Composition(comp)))
}

fn mutating_webhook(v: Value) -> Result<Decoded, serde_yaml::Error> {
    let hook = serde_yaml::from_value(v)?;
    Ok(Decoded::Object(PackageObject::MutatingWebhookConfiguration(hook)))
}

fn validating_webhook(v: Value) -> Result<Decoded, serde_yaml::Error> {
    let hook = serde_yaml::from_value(v)?;
    Ok(Decoded::Object(PackageObject::ValidatingWebhookConfiguration(hook)))
}

/// (apiVersion, kind) → decoder.
const SCHEME: &[(&str, &str, Decoder)] = &[
    ("meta.pkg.crossplane.io/v1", "Provider", provider),
    ("meta.pkg.crossplane.io/v1alpha1", "Provider", provider),
    ("meta.pkg.crossplane.io/v1", "Configuration", configuration),
    ("meta.pkg.crossplane.io/v1alpha1", "Configuration", configuration),
    ("apiextensions.k8s.io/v1", "CustomResourceDefinition", crd),
    ("apiextensions.crossplane.io/v1", "CompositeResourceDefinition", xrd),
    ("apiextensions.crossplane.io/v1", "Composition", composition),
    ("admissionregistration.k8s.io/v1", "MutatingWebhookConfiguration", mutating_webhook),
    ("admissionregistration.k8s.io/v1", "ValidatingWebhookConfiguration", validating_webhook),
];

fn lookup(api_version: &str, kind: &str) -> Option<Decoder> {
    SCHEME
        .iter()
        .find(|(v, k, _)| *v == api_version && *k == kind)
        .map(|(_, _, decoder)| *decoder)
}

/// Yields every non-empty document of `data` as a mapping with its index.
fn documents(data: &[u8]) -> impl Iterator<Item = Result<(usize, Mapping), ParseError>> + '_ {
    serde_yaml::Deserializer::from_slice(data)
        .enumerate()
        .filter_map(|(index, document)| {
            match Value::deserialize(document) {
                Ok(Value::Null) => None,
                Ok(Value::Mapping(mapping)) => Some(Ok((index, mapping))),
                Ok(_) => Some(Err(ParseError::NotAnObject { index })),
                Err(source) => Some(Err(ParseError::Yaml { index, source })),
            }
        })
}

fn type_meta(index: usize, mapping: &Mapping) -> Result<(String, String), ParseError> {
    let field = |name: &'static str| {
        mapping
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ParseError::MissingTypeMeta { index, field: name })
    };
    Ok((field("apiVersion")?, field("kind")?))
}

/// Parses a package stream.
///
/// Documents of a known (apiVersion, kind) must decode into their typed
/// shape; well-formed documents of other kinds are skipped.
pub fn parse(data: &[u8]) -> Result<Package, ParseError> {
    let mut package = Package::default();

    for document in documents(data) {
        let (index, mapping) = document?;
        let (api_version, kind) = type_meta(index, &mapping)?;

        let Some(decoder) = lookup(&api_version, &kind) else {
            debug!("skipping unrecognised object {} ({})", kind, api_version);
            continue;
        };

        let decoded = decoder(Value::Mapping(mapping)).map_err(|source| {
            ParseError::Decode {
                index,
                api_version: api_version.clone(),
                kind: kind.clone(),
                source,
            }
        })?;

        match decoded {
            Decoded::Meta(meta) => package.meta.push(meta),
            Decoded::Object(object) => package.objects.push(object),
        }
    }

    Ok(package)
}

/// Validates an examples stream; any object kind is accepted.
pub fn parse_examples(data: &[u8]) -> Result<Vec<Mapping>, ParseError> {
    documents(data)
        .map(|document| {
            let (index, mapping) = document?;
            type_meta(index, &mapping)?;
            Ok(mapping)
        })
        .collect()
}
