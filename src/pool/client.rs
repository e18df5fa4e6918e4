//! Pooled cluster clients and the factory seam that builds them.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, StatusCode};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use zeroize::Zeroizing;

use super::{ConnectionParams, PoolError};
use crate::config::ClientSettings;
use crate::domain::{AuthScheme, Credential, DataSourceId};

/// A live, authenticated client for one remote cluster.
///
/// Auth headers are baked into the underlying `reqwest::Client` and marked
/// sensitive, so the handle itself holds no secret material.
pub struct ClusterClient {
    data_source_id: DataSourceId,
    endpoint: Url,
    auth_scheme: AuthScheme,
    http: reqwest::Client,
    created_at: DateTime<Utc>,
    closed: AtomicBool,
}

impl ClusterClient {
    pub fn new(
        data_source_id: DataSourceId,
        endpoint: Url,
        auth_scheme: AuthScheme,
        http: reqwest::Client,
    ) -> Self {
        Self {
            data_source_id,
            endpoint,
            auth_scheme,
            http,
            created_at: Utc::now(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn data_source_id(&self) -> &DataSourceId {
        &self.data_source_id
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth_scheme
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the client closed. Further requests fail with [`PoolError::Closed`].
    /// Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(data_source_id = %self.data_source_id, "Closed cluster client");
        }
    }

    /// Start a request against a path relative to the endpoint.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let url = self
            .endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| PoolError::request(format!("invalid request path: {}", e)))?;
        Ok(self.http.request(method, url))
    }

    /// `GET /` against the cluster root.
    #[instrument(skip(self), fields(data_source_id = %self.data_source_id), name = "cluster_ping")]
    pub async fn ping(&self) -> Result<StatusCode, PoolError> {
        let response = self
            .request(Method::GET, "/")?
            .send()
            .await
            .map_err(|e| PoolError::request(e.without_url().to_string()))?;
        Ok(response.status())
    }
}

impl fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClient")
            .field("data_source_id", &self.data_source_id)
            .field("endpoint", &self.endpoint.as_str())
            .field("auth_scheme", &self.auth_scheme)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Construction seam of the pool.
///
/// Implementations must not retain `params` beyond the call.
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    async fn build(
        &self,
        data_source_id: &DataSourceId,
        params: &ConnectionParams,
    ) -> Result<ClusterClient, PoolError>;
}

/// Builds `reqwest`-backed clients with basic or API-key auth.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Self {
        Self { request_timeout, connect_timeout }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.request_timeout_seconds),
            Duration::from_secs(settings.connect_timeout_seconds),
        )
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, PoolError> {
    let url = Url::parse(endpoint)
        .map_err(|e| PoolError::construction(format!("invalid endpoint: {}", e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PoolError::construction(format!(
                "unsupported endpoint scheme '{}'",
                other
            )))
        }
    }
    if url.cannot_be_a_base() || url.host().is_none() {
        return Err(PoolError::construction("endpoint has no host"));
    }
    Ok(url)
}

fn authorization_header(credential: &Credential) -> Result<Option<HeaderValue>, PoolError> {
    let value = match credential {
        Credential::NoAuth => return Ok(None),
        Credential::UsernamePassword { username, password } => {
            let pair = Zeroizing::new(format!("{}:{}", username, password.expose_secret()));
            let token = Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(&*pair));
            Zeroizing::new(format!("Basic {}", *token))
        }
        Credential::ApiKey { api_key } => {
            Zeroizing::new(format!("ApiKey {}", api_key.expose_secret()))
        }
    };

    let mut header = HeaderValue::from_str(&value).map_err(|_| {
        PoolError::construction("credential contains characters not allowed in a header")
    })?;
    header.set_sensitive(true);
    Ok(Some(header))
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    #[instrument(skip(self, params), fields(data_source_id = %data_source_id), name = "build_cluster_client")]
    async fn build(
        &self,
        data_source_id: &DataSourceId,
        params: &ConnectionParams,
    ) -> Result<ClusterClient, PoolError> {
        let endpoint = parse_endpoint(&params.endpoint)?;

        let mut headers = HeaderMap::new();
        if let Some(value) = authorization_header(&params.credential)? {
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| PoolError::construction(format!("http client setup failed: {}", e)))?;

        debug!(endpoint = %endpoint, scheme = %params.credential.scheme(), "Built cluster client");

        Ok(ClusterClient::new(data_source_id.clone(), endpoint, params.credential.scheme(), http))
    }
}
