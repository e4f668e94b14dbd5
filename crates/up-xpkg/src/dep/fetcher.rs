use up_oci::{
    registry::{Credentials, RegistryClient},
    Image, ImageReference, OciError,
};

/// Source of package tags and images.
pub trait Fetcher {
    /// Lists every tag of the package named by `reference`.
    fn tags(&self, reference: &ImageReference) -> Result<Vec<String>, OciError>;

    /// Pulls the image at `reference`.
    fn fetch(&self, reference: &ImageReference) -> Result<Image, OciError>;

    /// Current digest of the image at `reference`, as [`Image::digest`]
    /// would report it after a fetch.
    fn digest(&self, reference: &ImageReference) -> Result<String, OciError>;
}

/// Fetcher backed by an OCI registry.
pub struct RegistryFetcher {
    client: RegistryClient,
}

impl RegistryFetcher {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            client: RegistryClient::new(credentials),
        }
    }
}

impl Fetcher for RegistryFetcher {
    fn tags(&self, reference: &ImageReference) -> Result<Vec<String>, OciError> {
        self.client.list_tags(reference)
    }

    fn fetch(&self, reference: &ImageReference) -> Result<Image, OciError> {
        self.client.pull(reference)
    }

    fn digest(&self, reference: &ImageReference) -> Result<String, OciError> {
        self.client.manifest_digest(reference)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        cell::Cell,
        collections::HashMap,
    };

    use super::*;

    /// In-memory fetcher serving fixed tags and images.
    #[derive(Default)]
    pub struct StaticFetcher {
        pub tags: Vec<String>,
        pub images: HashMap<String, Image>,
        pub fetches: Cell<usize>,
        pub fail_tags: bool,
    }

    impl StaticFetcher {
        pub fn with_tags(tags: &[&str]) -> Self {
            Self {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            }
        }

        pub fn with_image(mut self, reference: &str, image: Image) -> Self {
            self.images.insert(reference.to_string(), image);
            self
        }

        fn image(&self, reference: &ImageReference) -> Result<&Image, OciError> {
            self.images.get(&reference.to_string()).ok_or_else(|| {
                OciError::HttpError {
                    status: 404,
                    url: reference.to_string(),
                }
            })
        }
    }

    impl Fetcher for StaticFetcher {
        fn tags(&self, _reference: &ImageReference) -> Result<Vec<String>, OciError> {
            if self.fail_tags {
                return Err(OciError::HttpError {
                    status: 500,
                    url: "https://registry.test/v2/tags/list".to_string(),
                });
            }
            Ok(self.tags.clone())
        }

        fn fetch(&self, reference: &ImageReference) -> Result<Image, OciError> {
            self.fetches.set(self.fetches.get() + 1);
            self.image(reference).cloned()
        }

        fn digest(&self, reference: &ImageReference) -> Result<String, OciError> {
            self.image(reference)?.digest()
        }
    }
}
