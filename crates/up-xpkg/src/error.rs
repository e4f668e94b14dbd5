use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;
use up_oci::OciError;
use up_utils::error::FileSystemError;

#[derive(Error, Diagnostic, Debug)]
pub enum ParseError {
    #[error("document {index}: invalid YAML")]
    #[diagnostic(code(up_xpkg::parse::yaml))]
    Yaml {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("document {index} is not an object")]
    #[diagnostic(
        code(up_xpkg::parse::not_an_object),
        help("Every YAML document in a package must be a Kubernetes object")
    )]
    NotAnObject { index: usize },

    #[error("document {index} is missing `{field}`")]
    #[diagnostic(code(up_xpkg::parse::missing_type_meta))]
    MissingTypeMeta { index: usize, field: &'static str },

    #[error("document {index}: cannot decode {kind} ({api_version})")]
    #[diagnostic(code(up_xpkg::parse::decode))]
    Decode {
        index: usize,
        api_version: String,
        kind: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Error, Diagnostic, Debug, PartialEq, Eq)]
pub enum LintError {
    #[error("package must contain exactly one meta object, found {found}")]
    #[diagnostic(
        code(up_xpkg::lint::meta_count),
        help("Add a single crossplane.yaml with a Provider or Configuration to the package root")
    )]
    MetaCount { found: usize },

    #[error("package meta must be a {expected}, found {found}")]
    #[diagnostic(code(up_xpkg::lint::meta_type))]
    MetaType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid Crossplane version constraint '{constraint}': {reason}")]
    #[diagnostic(
        code(up_xpkg::lint::crossplane_constraint),
        help("Use a semver range such as \">=v1.14.0\"")
    )]
    CrossplaneConstraint { constraint: String, reason: String },

    #[error("invalid version constraint '{constraint}' for dependency {package}: {reason}")]
    #[diagnostic(code(up_xpkg::lint::dependency_constraint))]
    DependencyConstraint {
        package: String,
        constraint: String,
        reason: String,
    },

    #[error("dependency entry {index} names neither a provider nor a configuration")]
    #[diagnostic(code(up_xpkg::lint::dependency_package))]
    DependencyPackage { index: usize },

    #[error("{kind} '{name}' is not allowed in a {package_type} package")]
    #[diagnostic(
        code(up_xpkg::lint::object_kind),
        help("Providers may contain CRDs and webhook configurations; configurations may contain XRDs and Compositions")
    )]
    ObjectKind {
        kind: &'static str,
        name: String,
        package_type: &'static str,
    },
}

#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    #[error("{key} is not in the cache")]
    #[diagnostic(code(up_xpkg::cache::not_found))]
    NotFound { key: String },

    #[error("cache entry {path} is invalid: {reason}")]
    #[diagnostic(
        code(up_xpkg::cache::invalid_entry),
        help("Run `up xpkg dep --clean-cache` to reset the cache")
    )]
    InvalidEntry { path: PathBuf, reason: String },

    #[error("image has no base layer")]
    #[diagnostic(code(up_xpkg::cache::missing_base_layer))]
    MissingBaseLayer,

    #[error(transparent)]
    #[diagnostic(code(up_xpkg::cache::fs))]
    FileSystem(#[from] FileSystemError),

    #[error("failed to parse cached package")]
    #[diagnostic(code(up_xpkg::cache::parse))]
    Parse(#[from] ParseError),

    #[error("failed to read image")]
    #[diagnostic(code(up_xpkg::cache::image))]
    Image(#[from] OciError),

    #[error("failed to encode object")]
    #[diagnostic(code(up_xpkg::cache::encode))]
    Encode(#[from] serde_yaml::Error),
}

#[derive(Error, Diagnostic, Debug)]
pub enum ResolveError {
    #[error("invalid version constraint '{constraint}': {reason}")]
    #[diagnostic(
        code(up_xpkg::resolve::constraint),
        help("Use a semver range such as \">=v1.0.0\", \"~v1.2\" or \"v1.2.3\"")
    )]
    InvalidConstraint { constraint: String, reason: String },

    #[error("invalid package reference")]
    #[diagnostic(code(up_xpkg::resolve::reference))]
    InvalidReference(#[source] OciError),

    #[error("failed to list tags for {package}")]
    #[diagnostic(code(up_xpkg::resolve::tags))]
    ListTags {
        package: String,
        #[source]
        source: OciError,
    },

    #[error("no version of {package} satisfies '{constraint}'")]
    #[diagnostic(
        code(up_xpkg::resolve::no_match),
        help("Available tags: {}", .available.join(", "))
    )]
    NoMatchingVersion {
        package: String,
        constraint: String,
        available: Vec<String>,
    },
}

#[derive(Error, Diagnostic, Debug)]
pub enum XpkgError {
    #[error("failed to initialize {backend} backend")]
    #[diagnostic(code(up_xpkg::backend))]
    Backend {
        backend: &'static str,
        #[source]
        source: FileSystemError,
    },

    #[error("failed to parse package")]
    #[diagnostic(code(up_xpkg::parse))]
    Parse(#[from] ParseError),

    #[error("failed to lint package")]
    #[diagnostic(code(up_xpkg::lint))]
    Lint(#[from] LintError),

    #[error("failed to parse examples")]
    #[diagnostic(code(up_xpkg::examples))]
    Examples(#[source] ParseError),

    #[error("failed to build {layer} layer")]
    #[diagnostic(code(up_xpkg::layer))]
    Layer {
        layer: &'static str,
        #[source]
        source: OciError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to resolve dependency")]
    #[diagnostic(code(up_xpkg::resolve))]
    Resolve(#[from] ResolveError),

    #[error("failed to fetch {reference}")]
    #[diagnostic(code(up_xpkg::fetch))]
    Fetch {
        reference: String,
        #[source]
        source: OciError,
    },

    #[error("failed to update {path}")]
    #[diagnostic(code(up_xpkg::meta_file))]
    MetaFile {
        path: PathBuf,
        #[source]
        source: Box<XpkgError>,
    },

    #[error("{0}")]
    #[diagnostic(code(up_xpkg::invalid_meta_file))]
    InvalidMetaFile(String),

    #[error(transparent)]
    #[diagnostic(code(up_xpkg::fs))]
    FileSystem(#[from] FileSystemError),

    #[error("YAML error")]
    #[diagnostic(code(up_xpkg::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oci(#[from] OciError),
}

impl XpkgError {
    /// True when the error is a cache miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, XpkgError::Cache(CacheError::NotFound { .. }))
    }
}

pub type XpkgResult<T> = std::result::Result<T, XpkgError>;
