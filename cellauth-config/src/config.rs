use cellauth_token::{keypair_from_string, normalize_cell_url, CellKeyPair};
use serde::{Deserialize, Serialize};
use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration of one cell's authentication core
///
/// This structure holds everything a cell needs to issue and verify tokens:
/// its own URL and signing key, token lifetimes, and how foreign cells'
/// public keys are fetched and cached. It can be created manually or loaded
/// from various sources.
///
/// # Examples
///
/// ## Using the builder
///
/// ```no_run
/// # fn main() -> Result<(), cellauth_config::ConfigError> {
/// use cellauth_config::CellConfig;
///
/// let config = CellConfig::builder()
///     .cell_url("https://example.com/cell1")
///     .signing_key("ed25519/0000000000000000000000000000000000000000000000000000000000000000")
///     .access_token_lifetime(600)
///     .trusted_issuer("https://example.com/cell2/")
///     .build()?;
/// assert_eq!(config.cell_url, "https://example.com/cell1/");
/// # Ok(())
/// # }
/// ```
///
/// ## Loading from a JSON file
///
/// ```no_run
/// use cellauth_config::CellConfig;
/// use std::path::Path;
///
/// let config = CellConfig::from_file(Path::new("./cell.json"))
///     .expect("Failed to load configuration");
/// ```
///
/// ## Loading from environment variables
///
/// ```no_run
/// use cellauth_config::CellConfig;
///
/// // Assuming the following environment variables are set:
/// // CELLAUTH_CELL_URL=https://example.com/cell1/
/// // CELLAUTH_SIGNING_KEY=ed25519/<hex seed>
/// let config = CellConfig::from_env("CELLAUTH")
///     .expect("Failed to load configuration from environment");
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellConfig {
    /// URL of this cell, normalized with a trailing slash.
    pub cell_url: String,
    /// This cell's private key, `"ed25519/<hex seed>"`.
    pub signing_key: String,
    /// Seconds an access token stays valid.
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Seconds a refresh token stays valid.
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    /// Seconds a fetched public key is reused before it is fetched again.
    #[serde(default = "default_key_cache_ttl")]
    pub key_cache_ttl: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_directory_timeout_ms")]
    pub directory_timeout_ms: u64,
    /// Path, relative to a cell URL, where the cell publishes its public key.
    #[serde(default = "default_public_key_path")]
    pub public_key_path: String,
    /// When set, only these cells are trusted as token issuers.
    #[serde(default)]
    pub trusted_issuers: Option<Vec<String>>,
    /// Extra CA certificate (PEM) for fetching public keys.
    #[serde(default)]
    pub server_ca: Option<String>,
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    86400
}

fn default_key_cache_ttl() -> u64 {
    300
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_directory_timeout_ms() -> u64 {
    5000
}

fn default_public_key_path() -> String {
    "__auth/public_key".to_string()
}

impl fmt::Debug for CellConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellConfig")
            .field("cell_url", &self.cell_url)
            .field("signing_key", &"<redacted>")
            .field("access_token_lifetime", &self.access_token_lifetime)
            .field("refresh_token_lifetime", &self.refresh_token_lifetime)
            .field("key_cache_ttl", &self.key_cache_ttl)
            .field("fetch_timeout_ms", &self.fetch_timeout_ms)
            .field("directory_timeout_ms", &self.directory_timeout_ms)
            .field("public_key_path", &self.public_key_path)
            .field("trusted_issuers", &self.trusted_issuers)
            .field("server_ca", &self.server_ca.as_ref().map(|_| "<pem>"))
            .finish()
    }
}

/// Builder for CellConfig
///
/// You can also modify an existing configuration:
///
/// ```no_run
/// # fn main() -> Result<(), cellauth_config::ConfigError> {
/// # let config = cellauth_config::CellConfig::from_file("./cell.json")?;
/// let shorter = config.to_builder()
///     .access_token_lifetime(300)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug)]
pub struct CellConfigBuilder {
    cell_url: Option<String>,
    signing_key: Option<String>,
    access_token_lifetime: Option<i64>,
    refresh_token_lifetime: Option<i64>,
    key_cache_ttl: Option<u64>,
    fetch_timeout_ms: Option<u64>,
    directory_timeout_ms: Option<u64>,
    public_key_path: Option<String>,
    trusted_issuers: Option<Vec<String>>,
    server_ca: Option<String>,
}

impl CellConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new CellConfigBuilder from an existing CellConfig
    pub fn from_config(config: &CellConfig) -> Self {
        Self {
            cell_url: Some(config.cell_url.clone()),
            signing_key: Some(config.signing_key.clone()),
            access_token_lifetime: Some(config.access_token_lifetime),
            refresh_token_lifetime: Some(config.refresh_token_lifetime),
            key_cache_ttl: Some(config.key_cache_ttl),
            fetch_timeout_ms: Some(config.fetch_timeout_ms),
            directory_timeout_ms: Some(config.directory_timeout_ms),
            public_key_path: Some(config.public_key_path.clone()),
            trusted_issuers: config.trusted_issuers.clone(),
            server_ca: config.server_ca.clone(),
        }
    }

    pub fn cell_url(mut self, cell_url: impl Into<String>) -> Self {
        self.cell_url = Some(cell_url.into());
        self
    }

    /// Set the cell's private key
    ///
    /// # Arguments
    ///
    /// * `signing_key` - The key in `"ed25519/<hex seed>"` form
    pub fn signing_key(mut self, signing_key: impl Into<String>) -> Self {
        self.signing_key = Some(signing_key.into());
        self
    }

    pub fn access_token_lifetime(mut self, seconds: i64) -> Self {
        self.access_token_lifetime = Some(seconds);
        self
    }

    pub fn refresh_token_lifetime(mut self, seconds: i64) -> Self {
        self.refresh_token_lifetime = Some(seconds);
        self
    }

    pub fn key_cache_ttl(mut self, seconds: u64) -> Self {
        self.key_cache_ttl = Some(seconds);
        self
    }

    pub fn fetch_timeout_ms(mut self, millis: u64) -> Self {
        self.fetch_timeout_ms = Some(millis);
        self
    }

    pub fn directory_timeout_ms(mut self, millis: u64) -> Self {
        self.directory_timeout_ms = Some(millis);
        self
    }

    pub fn public_key_path(mut self, path: impl Into<String>) -> Self {
        self.public_key_path = Some(path.into());
        self
    }

    /// Add one cell to the trusted issuer allow-list
    pub fn trusted_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.trusted_issuers
            .get_or_insert_with(Vec::new)
            .push(issuer.into());
        self
    }

    pub fn trusted_issuers(mut self, issuers: Vec<String>) -> Self {
        self.trusted_issuers = Some(issuers);
        self
    }

    /// Set the server CA certificate used when fetching public keys
    ///
    /// # Arguments
    ///
    /// * `ca` - The server CA certificate in PEM format
    pub fn server_ca(mut self, ca: impl Into<String>) -> Self {
        self.server_ca = Some(ca.into());
        self
    }

    /// Build the CellConfig
    ///
    /// # Errors
    ///
    /// Returns an error if any required field is missing or invalid
    pub fn build(self) -> Result<CellConfig, ConfigError> {
        let config = CellConfig {
            cell_url: self.cell_url.ok_or(ConfigError::MissingCellUrl)?,
            signing_key: self.signing_key.ok_or(ConfigError::MissingSigningKey)?,
            access_token_lifetime: self
                .access_token_lifetime
                .unwrap_or_else(default_access_token_lifetime),
            refresh_token_lifetime: self
                .refresh_token_lifetime
                .unwrap_or_else(default_refresh_token_lifetime),
            key_cache_ttl: self.key_cache_ttl.unwrap_or_else(default_key_cache_ttl),
            fetch_timeout_ms: self.fetch_timeout_ms.unwrap_or_else(default_fetch_timeout_ms),
            directory_timeout_ms: self
                .directory_timeout_ms
                .unwrap_or_else(default_directory_timeout_ms),
            public_key_path: self
                .public_key_path
                .unwrap_or_else(default_public_key_path),
            trusted_issuers: self.trusted_issuers,
            server_ca: self.server_ca,
        };

        config.finish()
    }
}

/// Errors that can occur when working with cell configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingCellUrl,
    InvalidCellUrl(String),
    MissingSigningKey,
    InvalidSigningKey(String),
    InvalidLifetime(String),
    InvalidTimeout(String),
    InvalidCertificate(String),
    IOError(String),
    ParseError(String),
    EnvVarError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingCellUrl => {
                write!(f, "Cell URL is required but was not provided. Please specify the URL this cell is served at.")
            }
            ConfigError::InvalidCellUrl(url) => {
                write!(f, "Invalid cell URL '{}'. Cell URLs must be absolute http:// or https:// URLs.", url)
            }
            ConfigError::MissingSigningKey => {
                write!(f, "Signing key is required but was not provided. Generate one with `cellauth key generate`.")
            }
            ConfigError::InvalidSigningKey(e) => {
                write!(f, "Invalid signing key: {}. Keys must be in the form 'ed25519/<64 hex characters>'.", e)
            }
            ConfigError::InvalidLifetime(e) => {
                write!(f, "Invalid token lifetime: {}. Lifetimes are positive numbers of seconds.", e)
            }
            ConfigError::InvalidTimeout(e) => {
                write!(f, "Invalid timeout: {}. Timeouts are positive numbers of milliseconds.", e)
            }
            ConfigError::InvalidCertificate(e) => {
                write!(f, "Invalid certificate format: {}. Please ensure the certificate is properly PEM-encoded.", e)
            }
            ConfigError::IOError(e) => {
                write!(f, "I/O error occurred while reading configuration: {}. Please check file permissions and paths.", e)
            }
            ConfigError::ParseError(e) => {
                write!(f, "Failed to parse configuration data: {}. Please ensure the configuration format is correct.", e)
            }
            ConfigError::EnvVarError(e) => {
                write!(f, "Environment variable error: {}. Please ensure all required environment variables are set correctly.", e)
            }
        }
    }
}

impl Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        ConfigError::ParseError(error.to_string())
    }
}

#[cfg(feature = "toml")]
impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::ParseError(error.to_string())
    }
}

impl From<std::env::VarError> for ConfigError {
    fn from(error: std::env::VarError) -> Self {
        ConfigError::EnvVarError(error.to_string())
    }
}

fn optional_var(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvVarError(format!("{}: {}", name, e))),
    }
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    optional_var(name)?.ok_or_else(|| ConfigError::EnvVarError(format!("{} is not set", name)))
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional_var(name)? {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::ParseError(format!("{} has invalid value '{}'", name, value))),
        None => Ok(default),
    }
}

/// `{PREFIX}_{NAME}_FILE` wins over `{PREFIX}_{NAME}`.
fn var_or_file(prefix: &str, name: &str) -> Result<Option<String>, ConfigError> {
    match optional_var(&format!("{}_{}_FILE", prefix, name))? {
        Some(path) => fs::read_to_string(&path).map(Some).map_err(|e| {
            ConfigError::IOError(format!("Failed to read {} file {}: {}", name, path, e))
        }),
        None => optional_var(&format!("{}_{}", prefix, name)),
    }
}

impl CellConfig {
    /// Create a configuration with default lifetimes and timeouts
    ///
    /// The result is not validated; call [`CellConfig::validate`] or use the builder.
    pub fn new(cell_url: impl Into<String>, signing_key: impl Into<String>) -> Self {
        CellConfig {
            cell_url: normalize_cell_url(&cell_url.into()),
            signing_key: signing_key.into(),
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            key_cache_ttl: default_key_cache_ttl(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            directory_timeout_ms: default_directory_timeout_ms(),
            public_key_path: default_public_key_path(),
            trusted_issuers: None,
            server_ca: None,
        }
    }

    pub fn builder() -> CellConfigBuilder {
        CellConfigBuilder::new()
    }

    /// Convert this configuration to a builder for modification
    pub fn to_builder(&self) -> CellConfigBuilder {
        CellConfigBuilder::from_config(self)
    }

    /// Create a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file_content = fs::read_to_string(path)?;
        let config: CellConfig = serde_json::from_str(&file_content)?;
        config.finish()
    }

    /// Create a configuration from a TOML file
    #[cfg(feature = "toml")]
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file_content = fs::read_to_string(path)?;
        let config: CellConfig = toml::from_str(&file_content)?;
        config.finish()
    }

    /// Create a configuration from environment variables
    ///
    /// The environment variables should be named with the given prefix followed by:
    /// - CELL_URL: The URL of this cell
    /// - SIGNING_KEY: The cell's private key, `ed25519/<hex seed>`
    /// - ACCESS_TOKEN_LIFETIME, REFRESH_TOKEN_LIFETIME: seconds (optional)
    /// - KEY_CACHE_TTL: seconds (optional)
    /// - FETCH_TIMEOUT_MS, DIRECTORY_TIMEOUT_MS: milliseconds (optional)
    /// - PUBLIC_KEY_PATH: where cells publish their key (optional)
    /// - TRUSTED_ISSUERS: comma-separated cell URLs (optional)
    /// - SERVER_CA: PEM content (optional)
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any required environment variable is missing or invalid.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let signing_key = required_var(&format!("{}_SIGNING_KEY", prefix))?;
        let server_ca = optional_var(&format!("{}_SERVER_CA", prefix))?;
        Self::from_env_parts(prefix, signing_key, server_ca)
    }

    /// Create a configuration from environment variables or files
    ///
    /// This is similar to `from_env`, but the signing key and server CA can
    /// also be loaded from files. If `{PREFIX}_SIGNING_KEY_FILE` or
    /// `{PREFIX}_SERVER_CA_FILE` is present, the contents of the file at that
    /// path are used instead of the plain variable.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any required environment variable or file is missing or invalid.
    pub fn from_env_or_file(prefix: &str) -> Result<Self, ConfigError> {
        let signing_key = var_or_file(prefix, "SIGNING_KEY")?
            .ok_or(ConfigError::MissingSigningKey)?
            .trim()
            .to_string();
        let server_ca = var_or_file(prefix, "SERVER_CA")?;
        Self::from_env_parts(prefix, signing_key, server_ca)
    }

    fn from_env_parts(
        prefix: &str,
        signing_key: String,
        server_ca: Option<String>,
    ) -> Result<Self, ConfigError> {
        let cell_url = required_var(&format!("{}_CELL_URL", prefix))?;
        let var = |name: &str| format!("{}_{}", prefix, name);

        let trusted_issuers = optional_var(&var("TRUSTED_ISSUERS"))?.map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|issuer| !issuer.is_empty())
                .map(str::to_string)
                .collect()
        });

        let config = CellConfig {
            cell_url,
            signing_key,
            access_token_lifetime: parsed_var(
                &var("ACCESS_TOKEN_LIFETIME"),
                default_access_token_lifetime(),
            )?,
            refresh_token_lifetime: parsed_var(
                &var("REFRESH_TOKEN_LIFETIME"),
                default_refresh_token_lifetime(),
            )?,
            key_cache_ttl: parsed_var(&var("KEY_CACHE_TTL"), default_key_cache_ttl())?,
            fetch_timeout_ms: parsed_var(&var("FETCH_TIMEOUT_MS"), default_fetch_timeout_ms())?,
            directory_timeout_ms: parsed_var(
                &var("DIRECTORY_TIMEOUT_MS"),
                default_directory_timeout_ms(),
            )?,
            public_key_path: optional_var(&var("PUBLIC_KEY_PATH"))?
                .unwrap_or_else(default_public_key_path),
            trusted_issuers,
            server_ca,
        };

        config.finish()
    }

    /// Normalize URLs, then validate.
    fn finish(mut self) -> Result<Self, ConfigError> {
        self.cell_url = if self.cell_url.trim().is_empty() {
            String::new()
        } else {
            normalize_cell_url(&self.cell_url)
        };
        self.public_key_path = self.public_key_path.trim_start_matches('/').to_string();
        if let Some(issuers) = self.trusted_issuers.as_mut() {
            for issuer in issuers.iter_mut() {
                *issuer = normalize_cell_url(issuer);
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    ///
    /// Checks that all required fields are present and valid, and that the
    /// signing key parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_url.is_empty() {
            return Err(ConfigError::MissingCellUrl);
        }
        if !is_http_url(&self.cell_url) {
            return Err(ConfigError::InvalidCellUrl(self.cell_url.clone()));
        }

        if self.signing_key.is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }
        self.keypair()?;

        if self.access_token_lifetime <= 0 {
            return Err(ConfigError::InvalidLifetime(format!(
                "access_token_lifetime is {}",
                self.access_token_lifetime
            )));
        }
        if self.refresh_token_lifetime <= 0 {
            return Err(ConfigError::InvalidLifetime(format!(
                "refresh_token_lifetime is {}",
                self.refresh_token_lifetime
            )));
        }

        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("fetch_timeout_ms is 0".to_string()));
        }
        if self.directory_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "directory_timeout_ms is 0".to_string(),
            ));
        }

        if let Some(issuers) = &self.trusted_issuers {
            if let Some(bad) = issuers.iter().find(|issuer| !is_http_url(issuer)) {
                return Err(ConfigError::InvalidCellUrl(bad.clone()));
            }
        }

        if let Some(ca) = &self.server_ca {
            if !ca.contains("BEGIN CERTIFICATE") {
                return Err(ConfigError::InvalidCertificate(
                    "CA certificate does not contain 'BEGIN CERTIFICATE' marker".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Parse the configured signing key
    pub fn keypair(&self) -> Result<CellKeyPair, ConfigError> {
        keypair_from_string(self.signing_key.trim())
            .map_err(|e| ConfigError::InvalidSigningKey(e.to_string()))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_millis(self.directory_timeout_ms)
    }

    pub fn key_cache_duration(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl)
    }

    /// URL at which `cell_url` publishes its public key
    pub fn public_key_url(&self, cell_url: &str) -> String {
        format!("{}{}", normalize_cell_url(cell_url), self.public_key_path)
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/'))
}

/// Try to load a cell configuration from standard locations
///
/// This function attempts to load a configuration from:
/// 1. Environment variables with the prefix "CELLAUTH"
/// 2. A file at ./cellauth.json
/// 3. A file at ~/.cellauth/config.json
/// 4. A file at /etc/cellauth/config.json
/// 5. If the "toml" feature is enabled, TOML files at the same paths
///
/// Returns None if no configuration could be found.
pub fn try_load_default_config() -> Option<CellConfig> {
    if let Ok(config) = CellConfig::from_env_or_file("CELLAUTH") {
        return Some(config);
    }

    let json_paths = [
        "./cellauth.json",
        "~/.cellauth/config.json",
        "/etc/cellauth/config.json",
    ];
    for path in json_paths.iter() {
        let Some(expanded_path) = expand_home(path) else {
            continue;
        };
        if expanded_path.exists() {
            if let Ok(config) = CellConfig::from_file(&expanded_path) {
                return Some(config);
            }
        }
    }

    #[cfg(feature = "toml")]
    {
        let toml_paths = [
            "./cellauth.toml",
            "~/.cellauth/config.toml",
            "/etc/cellauth/config.toml",
        ];
        for path in toml_paths.iter() {
            let Some(expanded_path) = expand_home(path) else {
                continue;
            };
            if expanded_path.exists() {
                if let Ok(config) = CellConfig::from_toml(&expanded_path) {
                    return Some(config);
                }
            }
        }
    }

    None
}

fn expand_home(path: &str) -> Option<std::path::PathBuf> {
    match path.strip_prefix("~/") {
        Some(stripped) => dirs::home_dir().map(|home| home.join(stripped)),
        None => Some(Path::new(path).to_path_buf()),
    }
}
