//! # Cellauth
//!
//! Federated token protocol and ACL authorization core for multi-tenant cells.
//!
//! Each cell is an autonomous trust domain identified by its URL. A cell
//! authenticates its own accounts, issues tokens for them, and exchanges
//! tokens issued by other cells for its own. Every hop re-signs with its own
//! key, so a cell only ever needs the public key of the cell immediately
//! before it in a chain.
//!
//! ## Crates
//!
//! - [`cellauth_token`]: token model, wire codec and keys
//! - [`cellauth_acl`]: privilege registry, ACLs and their evaluation
//! - [`cellauth_config`]: cell configuration
//! - [`cellauth_api`]: public key fetching and grant endpoint bodies
//!
//! This crate wires them together:
//!
//! - [`TrustResolver`]: cached public keys of other cells
//! - [`CellDirectory`]: accounts, their roles and external role links
//! - [`AuthEngine`]: the password, assertion and refresh grants, and bearer authentication
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use cellauth::{
//!     AclEvaluator, AclLevel, AuthEngine, CellAuthError, CellConfig, CellKeyPair, GrantRequest,
//!     InMemoryDirectory,
//! };
//!
//! # async fn example() -> Result<(), CellAuthError> {
//! let config = CellConfig::new("https://example.com/cell1/", CellKeyPair::generate().to_key_string());
//!
//! let directory = Arc::new(InMemoryDirectory::new());
//! directory.add_account("user001", "password")?;
//! directory.link_account_role("user001", "https://example.com/cell1/__role/__/reader");
//!
//! let engine = AuthEngine::from_config(&config, directory)?;
//!
//! let params: HashMap<String, String> = [
//!     ("grant_type", "password"),
//!     ("username", "user001"),
//!     ("password", "password"),
//! ]
//! .into_iter()
//! .map(|(k, v)| (k.to_string(), v.to_string()))
//! .collect();
//! let response = engine.grant(GrantRequest::from_form(&params, None)?).await?;
//!
//! // Later, on a request carrying the access token
//! let context = engine.authenticate_bearer(&response.access_token).await?;
//! let acl = cellauth::parse_acl(r#"{"ace": [{"principal": {"href": "https://example.com/cell1/__role/__/reader"},
//!                                        "grant": {"privilege": ["read"]}}]}"#)?;
//! let allowed = AclEvaluator::default().authorize(&acl, &context, "read", AclLevel::Box);
//! # Ok(())
//! # }
//! ```

mod directory;
mod engine;
mod error;
mod trust;

pub use directory::{AccountRecord, CellDirectory, DirectoryError, InMemoryDirectory, StoredCredential};
pub use engine::{
    AuthEngine, ClientAssertion, Grant, GrantRequest, IssuedTokens, GRANT_TYPE_ASSERTION,
    GRANT_TYPE_PASSWORD, GRANT_TYPE_REFRESH_TOKEN, GRANT_TYPE_SAML_BEARER,
};
pub use error::{AuthError, CellAuthError, TrustError};
pub use trust::TrustResolver;

pub use cellauth_acl::{
    from_json, from_xml, parse_acl, to_json, to_xml, AccessContext, Ace, Acl, AclError,
    AclEvaluator, AclLevel, Principal, PrivilegeRegistry, SchemaRequirement, Vocabulary,
};
pub use cellauth_api::{
    ApiError, ErrorResponse, GrantResponse, HttpKeyFetcher, KeyFetcher, PublicKeyResponse,
};
pub use cellauth_config::{CellConfig, CellConfigBuilder, ConfigError};
pub use cellauth_token::{
    account_subject, decode_token, encode_token, mint_token, normalize_cell_url, CellKeyPair,
    CellPublicKey, Claims, KeyError, ParseError, Role, Token, TokenKind, TokenSigner,
    TokenTimeConfig, TokenVerifier, UnverifiedToken,
};

pub use cellauth_acl;
pub use cellauth_api;
pub use cellauth_config;
pub use cellauth_token;
