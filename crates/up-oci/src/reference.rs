//! Image reference parsing.
//!
//! Parses references like `xpkg.upbound.io/crossplane/provider-aws:v0.20.0`
//! into registry, repository, tag and digest.

use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::error::{OciError, Result};

/// Registry used when a reference does not name one.
pub const DEFAULT_REGISTRY: &str = "xpkg.upbound.io";

pub const DEFAULT_TAG: &str = "latest";

static REPOSITORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$")
        .expect("unable to compile repository regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("unable to compile tag regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parses `reference`, falling back to [`DEFAULT_REGISTRY`].
    pub fn parse(reference: &str) -> Result<Self> {
        Self::parse_with_registry(reference, DEFAULT_REGISTRY)
    }

    /// Parses `reference`, using `default_registry` when none is given.
    pub fn parse_with_registry(reference: &str, default_registry: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            OciError::InvalidReference {
                reference: reference.to_string(),
                reason: reason.to_string(),
            }
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty"));
        }

        let (name_tag, digest) = match trimmed.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid("digest must have the form algorithm:hex"));
                }
                (name, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        // A colon only separates a tag when it follows the last slash, so
        // `host:5000/repo` keeps its port.
        let last_slash = name_tag.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name_tag[last_slash..].rfind(':') {
            Some(pos) => {
                let split = last_slash + pos;
                (&name_tag[..split], Some(name_tag[split + 1..].to_string()))
            }
            None => (name_tag, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (default_registry.to_string(), name.to_string()),
        };

        if repository.is_empty() {
            return Err(invalid("repository is empty"));
        }
        if !REPOSITORY_RE.is_match(&repository) {
            return Err(invalid(
                "repository may only contain lowercase letters, digits and separators",
            ));
        }
        if let Some(tag) = &tag {
            if !TAG_RE.is_match(tag) {
                return Err(invalid("tag contains invalid characters"));
            }
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The package identity without tag or digest: `registry/repository`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Tag or digest to request from the registry.
    pub fn reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            digest: None,
            ..self.clone()
        }
    }

    /// Base URL of the registry API, e.g. `https://xpkg.upbound.io/v2`.
    ///
    /// Local registries are reached over plain HTTP.
    pub fn api_base(&self) -> String {
        let host = self.registry.split(':').next().unwrap_or_default();
        let scheme = if host == "localhost" || host == "127.0.0.1" {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{}/v2", self.registry)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = OciError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
