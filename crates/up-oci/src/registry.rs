//! Minimal OCI distribution client: tag listing, pull and push.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::debug;
use ureq::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK, LOCATION, WWW_AUTHENTICATE},
        Response, StatusCode,
    },
    Body,
};
use up_utils::hash::{is_sha256_digest, sha256_digest, verify_digest, SHA256_PREFIX};
use url::Url;

use crate::{
    error::{OciError, Result},
    http_client::SHARED_AGENT,
    image::Image,
    reference::ImageReference,
    types::{Index, Manifest, TagList, MANIFEST_ACCEPT, MEDIA_TYPE_MANIFEST},
};

const MAX_BLOB_SIZE: u64 = 512 * 1024 * 1024;
const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

/// Parsed `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Self::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let params = parse_auth_params(params);
        Some(Self::Bearer {
            realm: params.get("realm")?.clone(),
            service: params.get("service").cloned(),
            scope: params.get("scope").cloned(),
        })
    }
}

/// Splits `key="value",key2="value, with comma"` into a map.
fn parse_auth_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some((key, after_key)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();

        let (value, remaining) = if let Some(quoted) = after_key.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            }
        };

        params.insert(key, value.trim().to_string());
        rest = remaining.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    }

    params
}

/// Extracts the target of a `Link: <url>; rel="next"` header.
fn next_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.replace(' ', "").contains("rel=\"next\"") {
            return None;
        }
        target
            .trim()
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
    })
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

fn check_status(response: Response<Body>, url: &str) -> Result<Response<Body>> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(OciError::HttpError {
            status: response.status().as_u16(),
            url: url.to_string(),
        })
    }
}

fn read_body(response: &mut Response<Body>) -> Result<Vec<u8>> {
    Ok(response
        .body_mut()
        .with_config()
        .limit(MAX_BLOB_SIZE)
        .read_to_vec()?)
}

fn content_type(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
}

/// Registry client over the shared HTTP agent.
///
/// Authorization headers obtained from token exchanges are cached per
/// repository and action set for the lifetime of the client.
pub struct RegistryClient {
    credentials: Option<Credentials>,
    authorization: Mutex<HashMap<String, String>>,
}

impl RegistryClient {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            authorization: Mutex::new(HashMap::new()),
        }
    }

    fn cached_authorization(&self, key: &str) -> Option<String> {
        self.authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn cache_authorization(&self, key: String, value: String) {
        self.authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    /// Sends a request, answering one authentication challenge if the
    /// registry replies with 401.
    fn send<F>(&self, reference: &ImageReference, actions: &str, request: F) -> Result<Response<Body>>
    where
        F: Fn(Option<&str>) -> std::result::Result<Response<Body>, ureq::Error>,
    {
        let key = format!("{}:{actions}", reference.name());
        let cached = self.cached_authorization(&key);
        let response = request(cached.as_deref())?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let unauthorized = || {
            OciError::Unauthorized {
                registry: reference.registry.clone(),
            }
        };
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(Challenge::parse)
            .ok_or_else(unauthorized)?;

        let header = self.authorize(reference, actions, &challenge)?;
        let response = request(Some(&header))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(unauthorized());
        }

        self.cache_authorization(key, header);
        Ok(response)
    }

    fn authorize(
        &self,
        reference: &ImageReference,
        actions: &str,
        challenge: &Challenge,
    ) -> Result<String> {
        match challenge {
            Challenge::Basic => {
                self.credentials
                    .as_ref()
                    .map(Credentials::basic_header)
                    .ok_or_else(|| {
                        OciError::Unauthorized {
                            registry: reference.registry.clone(),
                        }
                    })
            }
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let wanted = format!("repository:{}:{actions}", reference.repository);
                let scope = match scope {
                    Some(scope) if scope == &wanted => scope.clone(),
                    _ => wanted,
                };

                let mut params = vec![("scope", scope.as_str())];
                if let Some(service) = service {
                    params.push(("service", service.as_str()));
                }
                let url = Url::parse_with_params(realm, &params).map_err(|source| {
                    OciError::InvalidUrl {
                        url: realm.clone(),
                        source,
                    }
                })?;

                debug!("requesting registry token from {}", url);
                let mut req = SHARED_AGENT.get(url.as_str());
                if let Some(credentials) = &self.credentials {
                    req = req.header(AUTHORIZATION, credentials.basic_header());
                }
                let mut response = req.call()?;
                if !response.status().is_success() {
                    return Err(OciError::Unauthorized {
                        registry: reference.registry.clone(),
                    });
                }

                let token: TokenResponse = response.body_mut().read_json()?;
                token
                    .token
                    .or(token.access_token)
                    .map(|t| format!("Bearer {t}"))
                    .ok_or_else(|| OciError::InvalidResponse("token response without token".into()))
            }
        }
    }

    /// Lists every tag of the repository, following pagination links.
    pub fn list_tags(&self, reference: &ImageReference) -> Result<Vec<String>> {
        let base = Url::parse(&reference.api_base()).map_err(|source| {
            OciError::InvalidUrl {
                url: reference.api_base(),
                source,
            }
        })?;
        let mut next = Some(format!(
            "{}/{}/tags/list",
            reference.api_base(),
            reference.repository
        ));
        let mut tags = Vec::new();

        while let Some(url) = next.take() {
            debug!("listing tags: {}", url);
            let response = self.send(reference, "pull", |auth| {
                let mut req = SHARED_AGENT.get(&url);
                if let Some(auth) = auth {
                    req = req.header(AUTHORIZATION, auth);
                }
                req.call()
            })?;
            let mut response = check_status(response, &url)?;

            if let Some(link) = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link)
            {
                let resolved = base.join(link).map_err(|source| {
                    OciError::InvalidUrl {
                        url: link.to_string(),
                        source,
                    }
                })?;
                next = Some(resolved.to_string());
            }

            let page: TagList = response.body_mut().read_json()?;
            tags.extend(page.tags.unwrap_or_default());
        }

        Ok(tags)
    }

    fn get_manifest(&self, reference: &ImageReference, target: &str) -> Result<(Vec<u8>, String)> {
        let url = format!(
            "{}/{}/manifests/{target}",
            reference.api_base(),
            reference.repository
        );
        let response = self.send(reference, "pull", |auth| {
            let mut req = SHARED_AGENT.get(&url).header(ACCEPT, MANIFEST_ACCEPT);
            if let Some(auth) = auth {
                req = req.header(AUTHORIZATION, auth);
            }
            req.call()
        })?;
        let mut response = check_status(response, &url)?;
        let media_type = content_type(&response).unwrap_or_else(|| MEDIA_TYPE_MANIFEST.into());
        let body = read_body(&mut response)?;

        if target.starts_with(SHA256_PREFIX) {
            let actual = sha256_digest(&body);
            if actual != target {
                return Err(OciError::DigestMismatch {
                    expected: target.to_string(),
                    actual,
                });
            }
        }

        Ok((body, media_type))
    }

    /// Fetches the image manifest for `reference`, descending into an index
    /// if the registry returns one.
    pub fn fetch_manifest(&self, reference: &ImageReference) -> Result<Vec<u8>> {
        let (body, media_type) = self.get_manifest(reference, reference.reference())?;

        if !Index::is_index_media_type(&media_type) {
            return Ok(body);
        }

        let index: Index = serde_json::from_slice(&body)?;
        let first = index
            .manifests
            .first()
            .ok_or_else(|| OciError::InvalidResponse(format!("{reference}: empty image index")))?;
        debug!("{} is an index, using manifest {}", reference, first.digest);
        let (body, _) = self.get_manifest(reference, &first.digest)?;
        Ok(body)
    }

    /// Digest of the image manifest [`pull`](Self::pull) would return.
    ///
    /// Uses `Docker-Content-Digest` from a manifest HEAD when the tag points
    /// at a plain manifest; otherwise hashes the resolved manifest.
    pub fn manifest_digest(&self, reference: &ImageReference) -> Result<String> {
        let url = format!(
            "{}/{}/manifests/{}",
            reference.api_base(),
            reference.repository,
            reference.reference()
        );
        let response = self.send(reference, "pull", |auth| {
            let mut req = SHARED_AGENT.head(&url).header(ACCEPT, MANIFEST_ACCEPT);
            if let Some(auth) = auth {
                req = req.header(AUTHORIZATION, auth);
            }
            req.call()
        })?;
        let response = check_status(response, &url)?;

        let is_index = content_type(&response).is_some_and(|mt| Index::is_index_media_type(&mt));
        let header = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .filter(|digest| is_sha256_digest(digest));

        match header {
            Some(digest) if !is_index => Ok(digest.to_string()),
            _ => Ok(sha256_digest(&self.fetch_manifest(reference)?)),
        }
    }

    /// Downloads a blob and verifies its digest.
    pub fn fetch_blob(&self, reference: &ImageReference, digest: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{}/blobs/{digest}",
            reference.api_base(),
            reference.repository
        );
        let response = self.send(reference, "pull", |auth| {
            let mut req = SHARED_AGENT.get(&url);
            if let Some(auth) = auth {
                req = req.header(AUTHORIZATION, auth);
            }
            req.call()
        })?;
        let mut response = check_status(response, &url)?;
        let body = read_body(&mut response)?;

        if !verify_digest(&body, digest) {
            return Err(OciError::DigestMismatch {
                expected: digest.to_string(),
                actual: sha256_digest(&body),
            });
        }
        Ok(body)
    }

    pub fn blob_exists(&self, reference: &ImageReference, digest: &str) -> Result<bool> {
        let url = format!(
            "{}/{}/blobs/{digest}",
            reference.api_base(),
            reference.repository
        );
        let response = self.send(reference, "pull,push", |auth| {
            let mut req = SHARED_AGENT.head(&url);
            if let Some(auth) = auth {
                req = req.header(AUTHORIZATION, auth);
            }
            req.call()
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                Err(OciError::HttpError {
                    status: status.as_u16(),
                    url,
                })
            }
        }
    }

    /// Uploads a blob with a monolithic POST + PUT unless it already exists.
    pub fn upload_blob(&self, reference: &ImageReference, digest: &str, data: &[u8]) -> Result<()> {
        if self.blob_exists(reference, digest)? {
            debug!("blob {} already present", digest);
            return Ok(());
        }

        let start = format!(
            "{}/{}/blobs/uploads/",
            reference.api_base(),
            reference.repository
        );
        let response = self.send(reference, "pull,push", |auth| {
            let mut req = SHARED_AGENT.post(&start);
            if let Some(auth) = auth {
                req = req.header(AUTHORIZATION, auth);
            }
            req.send_empty()
        })?;
        let response = check_status(response, &start)?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| OciError::InvalidResponse("upload response without Location".into()))?;
        let base = Url::parse(&start).map_err(|source| {
            OciError::InvalidUrl {
                url: start.clone(),
                source,
            }
        })?;
        let mut upload = base.join(location).map_err(|source| {
            OciError::InvalidUrl {
                url: location.to_string(),
                source,
            }
        })?;
        upload.query_pairs_mut().append_pair("digest", digest);
        let upload = upload.to_string();

        let response = self.send(reference, "pull,push", |auth| {
            let mut req = SHARED_AGENT
                .put(&upload)
                .header(CONTENT_TYPE, "application/octet-stream");
            if let Some(auth) = auth {
                req = req.header(AUTHORIZATION, auth);
            }
            req.send(data)
        })?;
        check_status(response, &upload)?;
        debug!("uploaded blob {} ({} bytes)", digest, data.len());
        Ok(())
    }

    pub fn put_manifest(
        &self,
        reference: &ImageReference,
        manifest: &[u8],
        media_type: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/{}/manifests/{}",
            reference.api_base(),
            reference.repository,
            reference.reference()
        );
        let response = self.send(reference, "pull,push", |auth| {
            let mut req = SHARED_AGENT.put(&url).header(CONTENT_TYPE, media_type);
            if let Some(auth) = auth {
                req = req.header(AUTHORIZATION, auth);
            }
            req.send(manifest)
        })?;
        check_status(response, &url)?;
        Ok(sha256_digest(manifest))
    }

    /// Pulls the complete image for `reference`.
    pub fn pull(&self, reference: &ImageReference) -> Result<Image> {
        debug!("pulling {}", reference);
        let manifest_bytes = self.fetch_manifest(reference)?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)?;

        let config = self.fetch_blob(reference, &manifest.config.digest)?;
        let layers = manifest
            .layers
            .iter()
            .map(|layer| self.fetch_blob(reference, &layer.digest))
            .collect::<Result<Vec<_>>>()?;

        Image::from_parts(manifest_bytes, config, layers)
    }

    /// Pushes `image` to `reference` and returns the manifest digest.
    pub fn push(&self, reference: &ImageReference, image: &Image) -> Result<String> {
        for layer in image.layers() {
            self.upload_blob(reference, layer.digest(), layer.blob())?;
        }
        let config = image.config_bytes()?;
        self.upload_blob(reference, &image.config_digest()?, &config)?;

        let manifest = image.manifest_bytes()?;
        let digest = self.put_manifest(reference, &manifest, &image.media_type()?)?;
        debug!("pushed {}@{}", reference, digest);
        Ok(digest)
    }
}
