mod error;
pub mod http;
pub mod model_layer;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use ::http::Uri;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ResolverConfig;
use crate::container_specs::{Manifest, SpecificationType};
use crate::reference::{Reference, ReferenceError};

pub use self::error::ResolveError;
pub use self::http::authentication_flow::{AnonymousReason, AuthState, AuthToken};
pub use self::http::RequestFailure;
pub use self::model_layer::{find_model_layer, ModelLayer};

use self::http::util::fetch_json;
use self::http::{build_http_client, HttpCli};

// algorithm:encoded, per the OCI image spec digest grammar.
const DIGEST_PATTERN: &str = r"^[a-z0-9]+(?:[+._-][a-z0-9]+)*:[a-zA-Z0-9=_-]+$";

fn digest_regex() -> &'static Regex {
    static DIGEST_REGEX: OnceLock<Regex> = OnceLock::new();
    DIGEST_REGEX.get_or_init(|| Regex::new(DIGEST_PATTERN).expect("digest pattern compiles"))
}

pub fn is_valid_digest(digest: &str) -> bool {
    digest_regex().is_match(digest)
}

/// Everything the external downloader needs to fetch a model blob.
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct BlobDownloadInfo {
    pub url: String,
    pub size: u64,
    pub digest: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Per-resolution state. Operations never mutate a context, they hand back an
/// updated copy, so one client can serve concurrent resolutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    reference: Reference,
    auth: AuthState,
}

impl ResolutionContext {
    pub fn new(reference: Reference) -> Self {
        Self {
            reference,
            auth: AuthState::default(),
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn with_auth(&self, auth: AuthState) -> Self {
        Self {
            reference: self.reference.clone(),
            auth,
        }
    }

    fn auth_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(token) = self.auth.token() {
            headers.insert(
                ::http::header::AUTHORIZATION.as_str().to_string(),
                token.bearer_header(),
            );
        }
        headers
    }
}

#[async_trait::async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn get_model_download_url(&self, reference: &str) -> Result<BlobDownloadInfo, ResolveError>;
}

pub struct RegistryClient {
    config: ResolverConfig,
    http_client: HttpCli,
}

impl RegistryClient {
    pub fn new(config: ResolverConfig) -> RegistryClient {
        RegistryClient {
            config,
            http_client: build_http_client(),
        }
    }

    pub fn parse_reference(&self, reference: &str) -> Result<Reference, ReferenceError> {
        Reference::parse_with(reference, &self.config.reference_defaults())
    }

    fn registry_base(&self, registry: &str) -> String {
        format!("{}://{}", self.config.registry_scheme.as_str(), registry)
    }

    /// Never fails; an unusable token endpoint degrades to anonymous access.
    pub async fn authenticate(&self, repository: &str) -> AuthState {
        http::authentication_flow::request_anonymous_token(
            &self.http_client,
            &self.config.auth_realm,
            &self.config.auth_service,
            repository,
        )
        .await
    }

    /// Fetches the manifest for the context's reference. Always refreshes the
    /// token first; the returned context carries the new auth state.
    pub async fn get_manifest(
        &self,
        ctx: &ResolutionContext,
    ) -> Result<(Manifest, ResolutionContext), ResolveError> {
        let reference = ctx.reference();
        let ctx = ctx.with_auth(self.authenticate(&reference.repository).await);

        let fetch_failed = |source: RequestFailure| ResolveError::ManifestFetchFailed {
            repository: reference.repository.clone(),
            tag: reference.tag.clone(),
            source,
        };

        let uri = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_base(&reference.registry),
            reference.repository,
            reference.tag
        )
        .parse::<Uri>()
        .map_err(|e| fetch_failed(e.into()))?;

        let mut headers = ctx.auth_headers();
        headers.insert(
            ::http::header::ACCEPT.as_str().to_string(),
            SpecificationType::accept_header(),
        );

        tracing::debug!("Fetching manifest {}", uri);
        let manifest: Manifest = fetch_json(&self.http_client, &uri, &headers)
            .await
            .map_err(fetch_failed)?;

        if manifest.specification_type().is_none() {
            tracing::debug!(
                "Manifest for {} has unrecognised media type {:?}",
                reference,
                manifest.media_type
            );
        }

        Ok((manifest, ctx))
    }

    /// Builds the blob descriptor for `layer`. Only authenticates when the
    /// context holds no token yet; performs no other network I/O.
    pub async fn get_blob_download_info(
        &self,
        ctx: &ResolutionContext,
        layer: &ModelLayer,
    ) -> Result<(BlobDownloadInfo, ResolutionContext), ResolveError> {
        if !is_valid_digest(&layer.digest) {
            return Err(ResolveError::InvalidDigest(layer.digest.clone()));
        }

        let ctx = if ctx.auth().is_authenticated() {
            ctx.clone()
        } else {
            ctx.with_auth(self.authenticate(&ctx.reference().repository).await)
        };
        let reference = ctx.reference();

        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.registry_base(&reference.registry),
            reference.repository,
            layer.digest
        );
        url.parse::<Uri>()
            .map_err(|e| ResolveError::InvalidBlobLocation {
                repository: reference.repository.clone(),
                source: e.into(),
            })?;

        let info = BlobDownloadInfo {
            url,
            size: layer.size,
            digest: layer.digest.clone(),
            headers: ctx.auth_headers(),
            filename: layer.title.clone(),
        };
        Ok((info, ctx))
    }

    pub fn find_model_layer(&self, manifest: &Manifest) -> Option<ModelLayer> {
        find_model_layer(manifest)
    }

    /// Resolves a model reference all the way to a download descriptor.
    pub async fn get_model_download_url(
        &self,
        reference: &str,
    ) -> Result<BlobDownloadInfo, ResolveError> {
        let reference = self.parse_reference(reference)?;
        tracing::debug!("Resolved reference to {}", reference);
        let ctx = ResolutionContext::new(reference);

        let (manifest, ctx) = self.get_manifest(&ctx).await?;

        let layer = self.find_model_layer(&manifest).ok_or_else(|| {
            ResolveError::ModelLayerNotFound {
                repository: ctx.reference().repository.clone(),
                tag: ctx.reference().tag.clone(),
            }
        })?;

        let (info, ctx) = self.get_blob_download_info(&ctx, &layer).await?;
        tracing::info!(
            "Model {} resolves to {} ({} bytes, {})",
            ctx.reference(),
            info.digest,
            info.size,
            if ctx.auth().is_authenticated() {
                "authenticated"
            } else {
                "anonymous"
            }
        );
        Ok(info)
    }
}

#[async_trait::async_trait]
impl ModelRegistry for RegistryClient {
    async fn get_model_download_url(&self, reference: &str) -> Result<BlobDownloadInfo, ResolveError> {
        RegistryClient::get_model_download_url(self, reference).await
    }
}
