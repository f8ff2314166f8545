//! Resolves model URLs into something the decoders can read, routing
//! cross-origin object-storage URLs through a same-origin proxy or a
//! credential-less direct fetch.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use thiserror::Error;
use url::Url;

use crate::config::{FetchPolicy, ModelFormat};
use crate::error::ViewerError;
use crate::refs::{FetchedResource, LocalRefStore};

/// Cookie policy for an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsMode {
    SameOrigin,
    Omit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub credentials: CredentialsMode,
    pub bearer: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: CredentialsMode::SameOrigin,
            bearer: None,
        }
    }

    pub fn omit_credentials(mut self) -> Self {
        self.credentials = CredentialsMode::Omit;
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
}

/// Minimal byte-fetching client. Hosts provide one per platform.
#[allow(async_fn_in_trait)]
pub trait HttpClient {
    async fn get(&self, request: &HttpRequest) -> Result<Vec<u8>, TransportError>;
}

/// Supplies the bearer token for the direct-fetch fallback.
pub trait CredentialProvider {
    fn bearer_token(&self) -> Option<String>;
}

/// Token holder that can be updated after construction.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|token| !token.is_empty())),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token.filter(|token| !token.is_empty());
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// How a source URL relates to the viewer's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Relative, same-origin, or not on a known storage host.
    Direct,
    /// On a cross-origin object-storage host.
    CrossOriginStorage,
}

pub struct ResourceFetcher<C> {
    client: C,
    refs: Arc<dyn LocalRefStore>,
    policy: FetchPolicy,
    app_origin: Option<Url>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl<C: HttpClient> ResourceFetcher<C> {
    pub fn new(client: C, refs: Arc<dyn LocalRefStore>, policy: FetchPolicy) -> Self {
        let app_origin = policy
            .app_origin
            .as_deref()
            .and_then(|origin| match Url::parse(origin) {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!("ignoring invalid app origin {origin}: {err}");
                    None
                }
            });
        Self {
            client,
            refs,
            policy,
            app_origin,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn route(&self, url: &str) -> Route {
        let Ok(parsed) = Url::parse(url) else {
            return Route::Direct;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return Route::Direct;
        }
        if let Some(origin) = &self.app_origin {
            if origin.origin() == parsed.origin() {
                return Route::Direct;
            }
        }
        let Some(host) = parsed.host_str() else {
            return Route::Direct;
        };
        let host = host.to_ascii_lowercase();
        let is_storage = self.policy.storage_hosts.iter().any(|pattern| {
            let pattern = pattern.trim_start_matches('.').to_ascii_lowercase();
            host == pattern || host.ends_with(&format!(".{pattern}"))
        });
        if is_storage {
            Route::CrossOriginStorage
        } else {
            Route::Direct
        }
    }

    /// Proxy URL for `source`, resolved against the app origin when one is set.
    pub fn proxy_url(&self, source: &str) -> Option<String> {
        let endpoint = self.policy.proxy_endpoint.as_deref()?;
        let base = match &self.app_origin {
            Some(origin) => origin.join(endpoint).ok()?.to_string(),
            None => endpoint.to_string(),
        };
        let separator = if base.contains('?') { '&' } else { '?' };
        Some(format!(
            "{base}{separator}url={}",
            urlencoding::encode(source)
        ))
    }

    /// Resolves `url` into a loadable resource. Never fails: every problem
    /// degrades to returning the original URL.
    pub async fn fetch(&self, url: &str, format: ModelFormat) -> FetchedResource {
        if self.route(url) == Route::Direct {
            debug!("loading {url} directly");
            return FetchedResource::pass_through(url);
        }

        if let Some(proxy) = self.proxy_url(url) {
            match self.client.get(&HttpRequest::get(proxy)).await {
                Ok(bytes) => {
                    if let Some(resource) = self.mint(url, bytes, format, "proxy") {
                        return resource;
                    }
                }
                Err(err) => self.degrade(url, format!("proxy: {err}")),
            }
        }

        let token = self
            .credentials
            .as_ref()
            .and_then(|provider| provider.bearer_token());
        let request = HttpRequest::get(url).omit_credentials().with_bearer(token);
        match self.client.get(&request).await {
            Ok(bytes) => {
                if let Some(resource) = self.mint(url, bytes, format, "direct fetch") {
                    return resource;
                }
            }
            Err(err) => self.degrade(url, format!("direct fetch: {err}")),
        }

        FetchedResource::degraded(url)
    }

    fn mint(
        &self,
        url: &str,
        bytes: Vec<u8>,
        format: ModelFormat,
        via: &str,
    ) -> Option<FetchedResource> {
        let size = bytes.len();
        match self.refs.mint(bytes, format.mime_type()) {
            Ok(local) => {
                info!("fetched {url} via {via} ({size} bytes)");
                Some(FetchedResource::owned(local))
            }
            Err(err) => {
                self.degrade(url, format!("{via}: unable to mint local reference: {err:#}"));
                None
            }
        }
    }

    fn degrade(&self, url: &str, reason: String) {
        let err = ViewerError::FetchDegraded {
            url: url.to_string(),
            reason,
        };
        warn!("{err}");
    }
}
