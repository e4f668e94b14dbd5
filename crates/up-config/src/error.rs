use miette::Diagnostic;
use thiserror::Error;
use up_utils::error::{FileSystemError, PathError, UtilsError};

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(up_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(up_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists at {0}")]
    #[diagnostic(
        code(up_config::already_exists),
        help("Remove the existing config file or use a different location")
    )]
    ConfigAlreadyExists(String),

    #[error("Registry entry has an empty host")]
    #[diagnostic(
        code(up_config::empty_registry_host),
        help("Every [[registries]] entry needs a host, e.g. host = \"xpkg.upbound.io\"")
    )]
    EmptyRegistryHost,

    #[error("Duplicate registry host: {0}")]
    #[diagnostic(
        code(up_config::duplicate_registry),
        help("Each registry host may only be configured once")
    )]
    DuplicateRegistryHost(String),

    #[error("Invalid default registry: {0}")]
    #[diagnostic(
        code(up_config::invalid_default_registry),
        help("Use a bare hostname such as `xpkg.upbound.io` without scheme or path")
    )]
    InvalidDefaultRegistry(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(up_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(up_config::utils))]
    Utils(#[from] UtilsError),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(up_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(up_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),

    #[error("Failed to annotate first table in array: {0}")]
    #[diagnostic(code(up_config::annotate_first_table))]
    AnnotateFirstTable(String),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
