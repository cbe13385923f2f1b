use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use cellauth_api::{HttpKeyFetcher, KeyFetcher};
use cellauth_config::CellConfig;
use cellauth_token::{normalize_cell_url, public_key_from_string, CellPublicKey};

use crate::error::TrustError;

#[derive(Debug, Clone, Copy)]
struct CachedKey {
    key: CellPublicKey,
    fetched_at: Instant,
    pinned: bool,
}

enum Attempt {
    Transient(String),
    Rejected(String),
}

/// Maps issuing cells to the public keys their signed tokens verify against.
///
/// Keys are cached for a bounded time. Concurrent misses for one issuer share
/// a single fetch and its outcome, failures included.
pub struct TrustResolver {
    fetcher: Arc<dyn KeyFetcher>,
    cache: DashMap<String, CachedKey>,
    in_flight: DashMap<String, Arc<OnceCell<Result<CellPublicKey, TrustError>>>>,
    ttl: Duration,
    fetch_timeout: Duration,
    trusted_issuers: Option<Vec<String>>,
}

impl TrustResolver {
    pub fn new(fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self {
            fetcher,
            cache: DashMap::new(),
            in_flight: DashMap::new(),
            ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(5),
            trusted_issuers: None,
        }
    }

    /// Resolver with the cell's cache TTL, fetch timeout and allow-list, its
    /// own key pinned.
    pub fn from_config(config: &CellConfig, fetcher: Arc<dyn KeyFetcher>) -> Self {
        let resolver = Self::new(fetcher)
            .with_ttl(config.key_cache_duration())
            .with_fetch_timeout(config.fetch_timeout())
            .with_trusted_issuers(config.trusted_issuers.clone());
        if let Ok(keypair) = config.keypair() {
            resolver.pin(&config.cell_url, keypair.public());
        }
        resolver
    }

    /// [`from_config`](Self::from_config) over an [`HttpKeyFetcher`].
    pub fn http(config: &CellConfig) -> Result<Self, cellauth_api::ApiError> {
        let fetcher = HttpKeyFetcher::from_config(config)?;
        Ok(Self::from_config(config, Arc::new(fetcher)))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Only fetch keys of these cells. `None` trusts every cell.
    pub fn with_trusted_issuers(mut self, issuers: Option<Vec<String>>) -> Self {
        self.trusted_issuers =
            issuers.map(|list| list.iter().map(|issuer| normalize_cell_url(issuer)).collect());
        self
    }

    /// Use `key` for `issuer` without ever fetching or expiring it.
    pub fn pin(&self, issuer: &str, key: CellPublicKey) {
        self.cache.insert(
            normalize_cell_url(issuer),
            CachedKey {
                key,
                fetched_at: Instant::now(),
                pinned: true,
            },
        );
    }

    /// Forget the key of `issuer`; the next resolve fetches it again.
    pub fn invalidate(&self, issuer: &str) {
        self.cache.remove(&normalize_cell_url(issuer));
    }

    /// The cached key of `issuer`, if present and fresh.
    pub fn cached(&self, issuer: &str) -> Option<CellPublicKey> {
        let entry = self.cache.get(&normalize_cell_url(issuer))?;
        if entry.pinned || entry.fetched_at.elapsed() < self.ttl {
            Some(entry.key)
        } else {
            None
        }
    }

    fn is_allowed(&self, issuer: &str) -> bool {
        match &self.trusted_issuers {
            Some(list) => list.iter().any(|trusted| trusted == issuer),
            None => true,
        }
    }

    /// Public key of `issuer`, from cache or fetched.
    pub async fn resolve(&self, issuer: &str) -> Result<CellPublicKey, TrustError> {
        let issuer = normalize_cell_url(issuer);
        if let Some(key) = self.cached(&issuer) {
            debug!(issuer = %issuer, "public key cache hit");
            return Ok(key);
        }

        if !self.is_allowed(&issuer) {
            warn!(issuer = %issuer, "issuer not in trusted list");
            return Err(TrustError::UntrustedIssuer {
                issuer,
                reason: "not in the trusted issuer list".to_string(),
            });
        }

        let slot = self.in_flight.entry(issuer.clone()).or_default().clone();
        let outcome = slot
            .get_or_init(|| async {
                // A fetch that finished just before this slot was created
                if let Some(key) = self.cached(&issuer) {
                    return Ok(key);
                }
                debug!(issuer = %issuer, "public key cache miss");
                let key = self.fetch_with_retry(&issuer).await?;
                self.cache.insert(
                    issuer.clone(),
                    CachedKey {
                        key,
                        fetched_at: Instant::now(),
                        pinned: false,
                    },
                );
                Ok(key)
            })
            .await
            .clone();

        self.in_flight
            .remove_if(&issuer, |_, current| Arc::ptr_eq(current, &slot));
        outcome
    }

    async fn fetch_with_retry(&self, issuer: &str) -> Result<CellPublicKey, TrustError> {
        let reason = match self.fetch_once(issuer).await {
            Ok(key) => return Ok(key),
            Err(Attempt::Transient(reason)) => reason,
            Err(Attempt::Rejected(reason)) => return Err(untrusted(issuer, reason)),
        };

        warn!(issuer = %issuer, reason = %reason, "public key fetch failed, retrying once");
        match self.fetch_once(issuer).await {
            Ok(key) => Ok(key),
            Err(Attempt::Transient(reason)) => Err(TrustError::Unreachable {
                issuer: issuer.to_string(),
                reason,
            }),
            Err(Attempt::Rejected(reason)) => Err(untrusted(issuer, reason)),
        }
    }

    async fn fetch_once(&self, issuer: &str) -> Result<CellPublicKey, Attempt> {
        let response =
            match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_public_key(issuer))
                .await
            {
                Err(_) => {
                    return Err(Attempt::Transient(format!(
                        "no answer within {:?}",
                        self.fetch_timeout
                    )))
                }
                Ok(Err(e)) if e.is_transient() => return Err(Attempt::Transient(e.to_string())),
                Ok(Err(e)) => return Err(Attempt::Rejected(e.to_string())),
                Ok(Ok(response)) => response,
            };

        if normalize_cell_url(&response.cell_url) != issuer {
            return Err(Attempt::Rejected(format!(
                "key document belongs to {}",
                response.cell_url
            )));
        }
        public_key_from_string(&response.public_key)
            .map_err(|e| Attempt::Rejected(format!("unusable public key: {e}")))
    }
}

fn untrusted(issuer: &str, reason: String) -> TrustError {
    warn!(issuer = %issuer, reason = %reason, "issuer rejected");
    TrustError::UntrustedIssuer {
        issuer: issuer.to_string(),
        reason,
    }
}
