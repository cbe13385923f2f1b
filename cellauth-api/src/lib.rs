//! # Cellauth API
//!
//! HTTP transport for cell authentication.
//!
//! Cells publish their Ed25519 public key at a well-known path under their
//! URL. This crate fetches those keys for the trust resolver and defines the
//! JSON bodies exchanged at the grant endpoint.
//!
//! ## Features
//!
//! - [`KeyFetcher`]: the seam the trust resolver fetches keys through
//! - [`HttpKeyFetcher`]: reqwest implementation, with an optional extra CA
//! - Wire types for the public key document and grant responses

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use cellauth_config::CellConfig;
use cellauth_token::normalize_cell_url;

/// Largest key document accepted. A real one is a few hundred bytes.
pub const MAX_KEY_DOCUMENT_BYTES: usize = 16 * 1024;

// Error type for key fetching
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("SSL configuration error: {0}")]
    SslConfig(String),

    #[error("HTTP error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Whether a retry might succeed: network failures, timeouts and 5xx/429 responses.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::HttpClient(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            ApiError::Timeout(_) => true,
            ApiError::SslConfig(_) | ApiError::InvalidResponse(_) => false,
        }
    }
}

/// Document a cell serves at `{cell_url}{public_key_path}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyResponse {
    pub response_msg: String,
    /// The cell the key belongs to
    pub cell_url: String,
    /// `"ed25519/<hex>"`
    pub public_key: String,
}

/// Successful response of the grant endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GrantResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `"Bearer"`
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Seconds until the refresh token expires
    pub refresh_token_expires_in: i64,
}

/// OAuth2-style error body of the grant endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Source of other cells' public key documents
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_public_key(&self, cell_url: &str) -> Result<PublicKeyResponse, ApiError>;
}

/// Fetches public key documents over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpKeyFetcher {
    client: reqwest::Client,
    public_key_path: String,
    timeout: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct HttpKeyFetcherBuilder {
    public_key_path: Option<String>,
    server_ca: Option<String>,
    timeout: Option<Duration>,
}

impl HttpKeyFetcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path appended to a cell URL to reach its key, e.g. `__auth/public_key`
    pub fn public_key_path(mut self, path: impl Into<String>) -> Self {
        self.public_key_path = Some(path.into());
        self
    }

    /// Trust an extra CA certificate in PEM format
    pub fn server_ca(mut self, ca: impl Into<String>) -> Self {
        self.server_ca = Some(ca.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HttpKeyFetcher, ApiError> {
        let mut builder = reqwest::ClientBuilder::new();

        if let Some(ca) = &self.server_ca {
            let cert = reqwest::Certificate::from_pem(ca.as_bytes())
                .map_err(|e| ApiError::SslConfig(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ApiError::SslConfig(e.to_string()))?;

        Ok(HttpKeyFetcher {
            client,
            public_key_path: self
                .public_key_path
                .unwrap_or_else(|| "__auth/public_key".to_string())
                .trim_start_matches('/')
                .to_string(),
            timeout: self.timeout,
        })
    }
}

impl HttpKeyFetcher {
    pub fn builder() -> HttpKeyFetcherBuilder {
        HttpKeyFetcherBuilder::new()
    }

    /// Fetcher using the cell's key path, CA and fetch timeout
    pub fn from_config(config: &CellConfig) -> Result<Self, ApiError> {
        let mut builder = Self::builder()
            .public_key_path(&config.public_key_path)
            .timeout(config.fetch_timeout());
        if let Some(ca) = &config.server_ca {
            builder = builder.server_ca(ca);
        }
        builder.build()
    }

    pub fn public_key_url(&self, cell_url: &str) -> String {
        format!("{}{}", normalize_cell_url(cell_url), self.public_key_path)
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_public_key(&self, cell_url: &str) -> Result<PublicKeyResponse, ApiError> {
        let url = self.public_key_url(cell_url);
        debug!(url = %url, "fetching public key");

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = self
                .read_limited(&mut response)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        let body = self.read_limited(&mut response).await?;
        let result = serde_json::from_slice::<PublicKeyResponse>(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        Ok(result)
    }
}

impl HttpKeyFetcher {
    fn request_error(&self, e: reqwest::Error) -> ApiError {
        match (e.is_timeout(), self.timeout) {
            (true, Some(timeout)) => ApiError::Timeout(timeout),
            _ => ApiError::HttpClient(e),
        }
    }

    /// Body of `response`, refusing anything over [`MAX_KEY_DOCUMENT_BYTES`].
    async fn read_limited(&self, response: &mut reqwest::Response) -> Result<Vec<u8>, ApiError> {
        let too_large =
            || ApiError::InvalidResponse(format!("body exceeds {MAX_KEY_DOCUMENT_BYTES} bytes"));

        if response
            .content_length()
            .is_some_and(|length| length > MAX_KEY_DOCUMENT_BYTES as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.request_error(e))? {
            if body.len() + chunk.len() > MAX_KEY_DOCUMENT_BYTES {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
