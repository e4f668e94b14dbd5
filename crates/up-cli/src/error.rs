use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;
use up_config::error::ConfigError;
use up_oci::OciError;
use up_utils::error::{FileSystemError, PathError};
use up_xpkg::{error::CacheError, XpkgError};

#[derive(Error, Diagnostic, Debug)]
pub enum UpError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Xpkg(#[from] XpkgError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oci(#[from] OciError),

    #[error(transparent)]
    #[diagnostic(code(up::path), help("Check the path and any environment variables it uses"))]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(code(up::fs), help("Check file permissions and disk space"))]
    FileSystem(#[from] FileSystemError),

    #[error("Error while {action}")]
    #[diagnostic(code(up::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No package file found in {}", .0.display())]
    #[diagnostic(
        code(up::no_package),
        help("Run `up xpkg build` first or pass the file with --package")
    )]
    NoPackageFile(PathBuf),

    #[error("Found more than one package file in {}", .dir.display())]
    #[diagnostic(
        code(up::multiple_packages),
        help("Pass the file to push with --package: {}", .files.join(", "))
    )]
    MultiplePackageFiles { dir: PathBuf, files: Vec<String> },

    #[error("Reference {0} has no tag")]
    #[diagnostic(
        code(up::missing_tag),
        help("Push to a tagged reference, e.g. xpkg.upbound.io/org/name:v1.0.0")
    )]
    MissingTag(String),

    #[error(transparent)]
    #[diagnostic(code(up::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(up::toml), help("Check your configuration syntax"))]
    Toml(#[from] toml::ser::Error),

    #[error("Command task failed: {0}")]
    #[diagnostic(code(up::task), help("This is an internal error, please report it"))]
    Task(#[from] tokio::task::JoinError),
}

impl From<CacheError> for UpError {
    fn from(err: CacheError) -> Self {
        Self::Xpkg(err.into())
    }
}

pub type UpResult<T> = std::result::Result<T, UpError>;

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> UpResult<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> UpResult<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            UpError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_with_context() {
        let result: io::Result<()> = Err(io::Error::from(io::ErrorKind::NotFound));
        let err = result
            .with_context(|| "reading package file".to_string())
            .unwrap_err();
        assert_eq!(err.to_string(), "Error while reading package file");
    }

    #[test]
    fn test_cache_miss_keeps_not_found() {
        let err: UpError = CacheError::NotFound {
            key: "xpkg.upbound.io/org/pkg@v1.0.0".to_string(),
        }
        .into();
        assert!(matches!(err, UpError::Xpkg(ref e) if e.is_not_found()));
    }
}
