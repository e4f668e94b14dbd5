use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum OciError {
    #[error("Invalid image reference '{reference}': {reason}")]
    #[diagnostic(
        code(up_oci::invalid_reference),
        help("Use the form [registry/]repository[:tag|@digest], e.g. xpkg.upbound.io/org/name:v1.0.0")
    )]
    InvalidReference { reference: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(up_oci::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(up_oci::http_error))]
    HttpError { status: u16, url: String },

    #[error("Authentication to {registry} failed")]
    #[diagnostic(
        code(up_oci::unauthorized),
        help("Add credentials for this registry to the [[registries]] section of your config or set UP_REGISTRY_USERNAME and UP_REGISTRY_PASSWORD")
    )]
    Unauthorized { registry: String },

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    #[diagnostic(code(up_oci::digest_mismatch))]
    DigestMismatch { expected: String, actual: String },

    #[error("Invalid response from registry: {0}")]
    #[diagnostic(code(up_oci::invalid_response))]
    InvalidResponse(String),

    #[error("Invalid image tarball: {0}")]
    #[diagnostic(
        code(up_oci::invalid_tarball),
        help("The file should be a package built with `up xpkg build`")
    )]
    InvalidTarball(String),

    #[error("Layer {0} not found")]
    #[diagnostic(code(up_oci::layer_not_found))]
    LayerNotFound(String),

    #[error("Invalid URL: {url}")]
    #[diagnostic(code(up_oci::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("JSON error: {0}")]
    #[diagnostic(code(up_oci::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(up_oci::io))]
    Io(#[from] std::io::Error),
}

impl From<ureq::Error> for OciError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, OciError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = OciError::HttpError {
            status: 404,
            url: "https://xpkg.upbound.io/v2/org/pkg/tags/list".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("HTTP 404"));
        assert!(msg.contains("tags/list"));
    }

    #[test]
    fn test_from_ureq_error() {
        let err: OciError = ureq::Error::ConnectionFailed.into();
        assert!(matches!(err, OciError::Network(_)));
    }

    #[test]
    fn test_digest_mismatch_display() {
        let err = OciError::DigestMismatch {
            expected: "sha256:aaa".to_string(),
            actual: "sha256:bbb".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Digest mismatch: expected sha256:aaa, got sha256:bbb"
        );
    }
}
