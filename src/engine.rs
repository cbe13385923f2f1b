use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use chrono::Utc;
use tracing::{debug, warn};

use cellauth_acl::AccessContext;
use cellauth_api::{GrantResponse, PublicKeyResponse};
use cellauth_config::CellConfig;
use cellauth_token::{
    account_subject, mint_token, normalize_cell_url, same_cell, CellKeyPair, Claims, ParseError,
    Token, TokenKind, TokenTimeConfig, UnverifiedToken,
};

use crate::directory::{CellDirectory, DirectoryError, StoredCredential};
use crate::error::{AuthError, CellAuthError, TrustError};
use crate::trust::TrustResolver;

pub const GRANT_TYPE_PASSWORD: &str = "password";
pub const GRANT_TYPE_ASSERTION: &str = "assertion";
pub const GRANT_TYPE_SAML_BEARER: &str = "urn:ietf:params:oauth:grant-type:saml2-bearer";
pub const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";

/// The credential a grant is made on
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    Password { username: String, password: String },
    Assertion { assertion: String },
    RefreshToken { refresh_token: String },
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grant::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Grant::Assertion { .. } => f.write_str("Assertion"),
            Grant::RefreshToken { .. } => f.write_str("RefreshToken"),
        }
    }
}

/// Client application credentials: the client cell's URL and a trans-cell
/// access token that cell issued to this one.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientAssertion {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAssertion")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// A parsed request to the grant endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub grant: Grant,
    /// Cell the access token is for; `None` for a local access token
    pub target: Option<String>,
    pub client: Option<ClientAssertion>,
}

impl GrantRequest {
    pub fn new(grant: Grant) -> Self {
        Self {
            grant,
            target: None,
            client: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client = Some(ClientAssertion {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        });
        self
    }

    /// Parse form parameters and an optional `Authorization` header.
    ///
    /// Client credentials may come from `client_id`/`client_secret` or from
    /// a `Basic` header, but the two must agree when both are present.
    pub fn from_form(
        params: &HashMap<String, String>,
        authorization: Option<&str>,
    ) -> Result<Self, AuthError> {
        let param = |name: &str| {
            params
                .get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &str| {
            param(name)
                .map(str::to_string)
                .ok_or_else(|| AuthError::InvalidRequest(format!("missing parameter {name}")))
        };

        let grant = match param("grant_type") {
            Some(GRANT_TYPE_PASSWORD) => Grant::Password {
                username: required("username")?,
                password: required("password")?,
            },
            Some(GRANT_TYPE_ASSERTION) | Some(GRANT_TYPE_SAML_BEARER) => Grant::Assertion {
                assertion: required("assertion")?,
            },
            Some(GRANT_TYPE_REFRESH_TOKEN) => Grant::RefreshToken {
                refresh_token: required("refresh_token")?,
            },
            Some(other) => {
                return Err(AuthError::InvalidRequest(format!(
                    "unsupported grant_type {other}"
                )))
            }
            None => return Err(AuthError::InvalidRequest("missing parameter grant_type".into())),
        };

        let form_client = match (param("client_id"), param("client_secret")) {
            (Some(id), Some(secret)) => Some(ClientAssertion {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            (None, None) => None,
            _ => {
                return Err(AuthError::InvalidRequest(
                    "client_id and client_secret must be given together".into(),
                ))
            }
        };
        let header_client = authorization.map(parse_basic_authorization).transpose()?;
        let client = match (form_client, header_client) {
            (Some(form), Some(header)) if form != header => {
                return Err(AuthError::InvalidRequest(
                    "client credentials in form and header differ".into(),
                ))
            }
            (form, header) => form.or(header),
        };

        Ok(Self {
            grant,
            target: param("target").or_else(|| param("p_target")).map(str::to_string),
            client,
        })
    }
}

fn parse_basic_authorization(header: &str) -> Result<ClientAssertion, AuthError> {
    let invalid = || AuthError::InvalidRequest("malformed Basic authorization header".into());

    let encoded = header
        .trim()
        .strip_prefix("Basic ")
        .ok_or_else(invalid)?
        .trim();
    let decoded = BASE64_STANDARD.decode(encoded).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (client_id, client_secret) = decoded.split_once(':').ok_or_else(invalid)?;
    if client_id.is_empty() || client_secret.is_empty() {
        return Err(invalid());
    }

    Ok(ClientAssertion {
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
    })
}

/// A freshly minted access and refresh token
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: Token,
    pub refresh: Token,
    pub access_token: String,
    pub refresh_token: String,
}

impl IssuedTokens {
    pub fn to_response(&self) -> GrantResponse {
        GrantResponse {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: self.access.claims().lifetime,
            refresh_token_expires_in: self.refresh.claims().lifetime,
        }
    }
}

/// Issues and accepts the tokens of one cell.
pub struct AuthEngine {
    cell_url: String,
    keypair: CellKeyPair,
    resolver: Arc<TrustResolver>,
    directory: Arc<dyn CellDirectory>,
    access_token_lifetime: i64,
    refresh_token_lifetime: i64,
    directory_timeout: Duration,
}

impl AuthEngine {
    /// Engine for the cell described by `config`. The cell's own key is
    /// pinned in `resolver`.
    pub fn new(
        config: &CellConfig,
        resolver: Arc<TrustResolver>,
        directory: Arc<dyn CellDirectory>,
    ) -> Result<Self, CellAuthError> {
        config.validate()?;
        let keypair = config.keypair()?;
        let cell_url = normalize_cell_url(&config.cell_url);
        resolver.pin(&cell_url, keypair.public());

        Ok(Self {
            cell_url,
            keypair,
            resolver,
            directory,
            access_token_lifetime: config.access_token_lifetime,
            refresh_token_lifetime: config.refresh_token_lifetime,
            directory_timeout: config.directory_timeout(),
        })
    }

    /// Engine fetching foreign keys over HTTP.
    pub fn from_config(
        config: &CellConfig,
        directory: Arc<dyn CellDirectory>,
    ) -> Result<Self, CellAuthError> {
        let resolver = Arc::new(TrustResolver::http(config)?);
        Self::new(config, resolver, directory)
    }

    pub fn cell_url(&self) -> &str {
        &self.cell_url
    }

    pub fn resolver(&self) -> &Arc<TrustResolver> {
        &self.resolver
    }

    /// The document this cell serves at its public key path
    pub fn public_key_response(&self) -> PublicKeyResponse {
        PublicKeyResponse {
            response_msg: "ok".to_string(),
            cell_url: self.cell_url.clone(),
            public_key: self.keypair.public().to_string(),
        }
    }

    /// Handle a grant endpoint request.
    pub async fn grant(&self, request: GrantRequest) -> Result<GrantResponse, AuthError> {
        let target = request.target.as_deref();
        let schema = match &request.client {
            Some(client) => Some(self.verify_client(client).await?),
            None => None,
        };

        let result = match &request.grant {
            Grant::Password { username, password } => {
                debug!(cell = %self.cell_url, username = %username, "password grant");
                self.password_grant(username, password, target, schema.as_deref())
                    .await
            }
            Grant::Assertion { assertion } => {
                debug!(cell = %self.cell_url, "assertion grant");
                self.assertion_grant(assertion, target, schema.as_deref())
                    .await
            }
            Grant::RefreshToken { refresh_token } => {
                debug!(cell = %self.cell_url, "refresh grant");
                self.refresh_grant(refresh_token, target, schema.as_deref())
                    .await
            }
        };

        result.map(|issued| issued.to_response())
    }

    /// Authenticate an account and issue an access token with every role
    /// linked to it, plus a local refresh token.
    pub async fn password_grant(
        &self,
        username: &str,
        password: &str,
        target: Option<&str>,
        schema: Option<&str>,
    ) -> Result<IssuedTokens, AuthError> {
        let account = self
            .within_directory_timeout(self.directory.find_account(username))
            .await?;

        let authenticated = match &account {
            Some(record) => record.credential.matches(password),
            None => {
                StoredCredential::verify_dummy(password);
                false
            }
        };
        if !authenticated {
            warn!(cell = %self.cell_url, username = %username, "password grant rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let roles = self
            .within_directory_timeout(self.directory.roles_of_account(username))
            .await?;
        let now = Utc::now().timestamp();
        self.within_directory_timeout(self.directory.record_authentication(username, now))
            .await?;

        let claims = Claims::new_with_time(
            &self.cell_url,
            account_subject(&self.cell_url, username),
            TokenTimeConfig::at(now, self.access_token_lifetime),
        )
        .with_schema(schema.map(str::to_string))
        .with_roles(roles);

        let refresh = Token::local_refresh(self.refresh_claims(&claims));
        Ok(self.issue(self.access_token(claims, target), refresh))
    }

    /// Exchange an access token addressed to this cell for tokens issued by
    /// this cell. Roles of a foreign issuer are mapped through this cell's
    /// role links.
    pub async fn assertion_grant(
        &self,
        assertion: &str,
        target: Option<&str>,
        schema: Option<&str>,
    ) -> Result<IssuedTokens, AuthError> {
        let presented = self.verify_inbound(assertion).await?;
        if presented.kind().is_refresh() {
            warn!(cell = %self.cell_url, kind = %presented.kind(), "assertion grant rejected");
            return Err(ParseError::malformed("assertion must be an access token").into());
        }

        let roles = if presented.is_issued_by(&self.cell_url) {
            presented.roles().to_vec()
        } else {
            self.map_foreign_roles(presented.issuer(), presented.roles())
                .await?
        };

        let now = Utc::now().timestamp();
        let claims = Claims::new_with_time(
            &self.cell_url,
            presented.subject(),
            TokenTimeConfig::at(now, self.access_token_lifetime),
        )
        .with_schema(schema.map(str::to_string))
        .with_roles(roles);

        let refresh = Token::trans_cell_refresh(self.refresh_claims(&claims));
        Ok(self.issue(self.access_token(claims, target), refresh))
    }

    /// Rotate a refresh token issued by this cell. Issuer, subject, schema
    /// and roles are carried over unchanged.
    pub async fn refresh_grant(
        &self,
        refresh_token: &str,
        target: Option<&str>,
        schema: Option<&str>,
    ) -> Result<IssuedTokens, AuthError> {
        let unverified = UnverifiedToken::parse(refresh_token)?;
        if !unverified.kind().is_refresh() {
            warn!(cell = %self.cell_url, kind = %unverified.kind(), "refresh grant rejected");
            return Err(ParseError::malformed("not a refresh token").into());
        }
        if !same_cell(unverified.issuer(), &self.cell_url) {
            warn!(cell = %self.cell_url, issuer = %unverified.issuer(), "refresh token from another cell");
            return Err(ParseError::WrongIssuer {
                expected: self.cell_url.clone(),
                actual: unverified.issuer().to_string(),
            }
            .into());
        }

        let now = Utc::now().timestamp();
        let presented = unverified
            .verify(&self.cell_url, &self.keypair.public(), now)
            .map_err(|e| {
                warn!(cell = %self.cell_url, error = %e, "refresh grant rejected");
                AuthError::InvalidGrant(e)
            })?;

        if let Some(schema) = schema {
            if presented.schema() != Some(normalize_cell_url(schema).as_str()) {
                warn!(cell = %self.cell_url, "client does not match the refresh token's schema");
                return Err(AuthError::InvalidClient(
                    "client does not match the token's schema".into(),
                ));
            }
        }

        let refresh = presented.rotate(now);
        let mut claims = refresh.claims().clone();
        claims.lifetime = self.access_token_lifetime;
        Ok(self.issue(self.access_token(claims, target), refresh))
    }

    /// Verify a bearer access token presented to this cell.
    pub async fn authenticate_bearer(&self, token: &str) -> Result<AccessContext, AuthError> {
        let token = self.verify_inbound(token).await?;
        match token.kind() {
            TokenKind::LocalAccess | TokenKind::TransCellAccess => Ok(AccessContext::from_token(&token)),
            TokenKind::LocalRefresh | TokenKind::TransCellRefresh => {
                Err(ParseError::malformed("refresh tokens cannot authorize requests").into())
            }
        }
    }

    /// Decode a token presented to this cell, resolving the issuer's key for
    /// signed kinds.
    async fn verify_inbound(&self, token: &str) -> Result<Token, AuthError> {
        let unverified = UnverifiedToken::parse(token)?;
        let now = Utc::now().timestamp();

        let verified = if unverified.kind().is_signed() {
            let key = self.resolver.resolve(unverified.issuer()).await?;
            unverified.verify(&self.cell_url, &key, now)
        } else {
            unverified.verify(&self.cell_url, &self.keypair.public(), now)
        };

        verified.map_err(|e| {
            warn!(cell = %self.cell_url, error = %e, "presented token rejected");
            AuthError::InvalidGrant(e)
        })
    }

    /// Check a client assertion and return the schema it proves.
    async fn verify_client(&self, client: &ClientAssertion) -> Result<String, AuthError> {
        let reject = |reason: String| {
            warn!(cell = %self.cell_url, client_id = %client.client_id, reason = %reason, "client assertion rejected");
            AuthError::InvalidClient(reason)
        };

        let unverified =
            UnverifiedToken::parse(&client.client_secret).map_err(|e| reject(e.to_string()))?;
        if unverified.kind() != TokenKind::TransCellAccess {
            return Err(reject(format!("client secret is a {} token", unverified.kind())));
        }

        let schema = normalize_cell_url(&client.client_id);
        if normalize_cell_url(unverified.issuer()) != schema {
            return Err(reject("client secret was not issued by the client".into()));
        }

        let key = match self.resolver.resolve(&schema).await {
            Ok(key) => key,
            Err(e @ TrustError::Unreachable { .. }) => return Err(e.into()),
            Err(e) => return Err(reject(e.to_string())),
        };
        unverified
            .verify(&self.cell_url, &key, Utc::now().timestamp())
            .map_err(|e| reject(e.to_string()))?;

        Ok(schema)
    }

    async fn map_foreign_roles(
        &self,
        foreign_cell: &str,
        foreign_roles: &[String],
    ) -> Result<Vec<String>, AuthError> {
        let mut roles = self
            .within_directory_timeout(self.directory.linked_roles(foreign_cell, None))
            .await?;

        for foreign_role in foreign_roles {
            let linked = self
                .within_directory_timeout(self.directory.linked_roles(foreign_cell, Some(foreign_role)))
                .await?;
            if linked.is_empty() {
                roles.push(foreign_role.clone());
            } else {
                roles.extend(linked);
            }
        }

        let mut seen = std::collections::HashSet::new();
        roles.retain(|role| seen.insert(role.clone()));
        debug!(
            cell = %self.cell_url,
            foreign_cell = %foreign_cell,
            roles = roles.len(),
            "mapped foreign roles"
        );
        Ok(roles)
    }

    async fn within_directory_timeout<T>(
        &self,
        operation: impl Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.directory_timeout, operation).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => {
                warn!(cell = %self.cell_url, timeout = ?self.directory_timeout, "directory timed out");
                Err(AuthError::Timeout(self.directory_timeout))
            }
        }
    }

    fn refresh_claims(&self, access_claims: &Claims) -> Claims {
        let mut claims = access_claims.clone();
        claims.lifetime = self.refresh_token_lifetime;
        claims
    }

    fn access_token(&self, claims: Claims, target: Option<&str>) -> Token {
        match target {
            Some(target) => Token::trans_cell_access(claims, target),
            None => Token::local_access(claims),
        }
    }

    fn issue(&self, access: Token, refresh: Token) -> IssuedTokens {
        IssuedTokens {
            access_token: mint_token(&access, &self.keypair),
            refresh_token: mint_token(&refresh, &self.keypair),
            access,
            refresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use async_trait::async_trait;
    use cellauth_api::{ApiError, KeyFetcher};

    const CELL: &str = "https://example.com/cell1/";

    struct NoFetch;

    #[async_trait]
    impl KeyFetcher for NoFetch {
        async fn fetch_public_key(&self, _cell_url: &str) -> Result<PublicKeyResponse, ApiError> {
            Err(ApiError::Status {
                status: 404,
                body: String::new(),
            })
        }
    }

    fn engine() -> (AuthEngine, Arc<InMemoryDirectory>) {
        let keypair = CellKeyPair::from_seed([7u8; 32]);
        let config = CellConfig::new(CELL, keypair.to_key_string());
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_account("user001", "pw").unwrap();
        directory.link_account_role("user001", "https://example.com/cell1/__role/__/reader");
        let engine = AuthEngine::new(
            &config,
            Arc::new(TrustResolver::new(Arc::new(NoFetch))),
            directory.clone(),
        )
        .unwrap();
        (engine, directory)
    }

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_form() {
        let request = GrantRequest::from_form(
            &form(&[
                ("grant_type", "password"),
                ("username", "user001"),
                ("password", "pw"),
                ("p_target", "https://example.com/cell2/"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(
            request.grant,
            Grant::Password {
                username: "user001".into(),
                password: "pw".into()
            }
        );
        assert_eq!(request.target.as_deref(), Some("https://example.com/cell2/"));
        assert!(request.client.is_none());

        let request = GrantRequest::from_form(
            &form(&[("grant_type", GRANT_TYPE_SAML_BEARER), ("assertion", "LA.x.y")]),
            None,
        )
        .unwrap();
        assert!(matches!(request.grant, Grant::Assertion { .. }));
    }

    #[test]
    fn test_from_form_rejects_bad_requests() {
        let cases = [
            form(&[]),
            form(&[("grant_type", "client_credentials")]),
            form(&[("grant_type", "password"), ("username", "user001")]),
            form(&[("grant_type", "refresh_token"), ("refresh_token", " ")]),
            form(&[
                ("grant_type", "assertion"),
                ("assertion", "a"),
                ("client_id", "https://app.example/"),
            ]),
        ];
        for params in cases {
            let err = GrantRequest::from_form(&params, None).unwrap_err();
            assert_eq!(err.status_code(), 400, "{params:?}");
        }
    }

    #[test]
    fn test_basic_authorization_header() {
        let params = form(&[("grant_type", "refresh_token"), ("refresh_token", "t")]);
        let header = format!(
            "Basic {}",
            BASE64_STANDARD.encode("https://app.example/:TA.secret.seal")
        );

        let request = GrantRequest::from_form(&params, Some(&header)).unwrap();
        let client = request.client.unwrap();
        assert_eq!(client.client_id, "https://app.example/");
        assert_eq!(client.client_secret, "TA.secret.seal");

        assert!(GrantRequest::from_form(&params, Some("Bearer abc")).is_err());

        let mut contradicting = params.clone();
        contradicting.insert("client_id".into(), "https://other.example/".into());
        contradicting.insert("client_secret".into(), "TA.secret.seal".into());
        assert!(GrantRequest::from_form(&contradicting, Some(&header)).is_err());
    }

    #[tokio::test]
    async fn test_password_grant() {
        let (engine, directory) = engine();

        let issued = engine.password_grant("user001", "pw", None, None).await.unwrap();
        assert_eq!(issued.access.kind(), TokenKind::LocalAccess);
        assert_eq!(issued.refresh.kind(), TokenKind::LocalRefresh);
        assert_eq!(issued.access.subject(), "https://example.com/cell1/#user001");
        assert_eq!(
            issued.access.roles(),
            ["https://example.com/cell1/__role/__/reader".to_string()]
        );
        assert!(directory.last_authenticated("user001").is_some());

        let context = engine.authenticate_bearer(&issued.access_token).await.unwrap();
        assert_eq!(context.subject, "https://example.com/cell1/#user001");
        assert!(engine.authenticate_bearer(&issued.refresh_token).await.is_err());

        let response = issued.to_response();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.refresh_token_expires_in, 86400);
    }

    #[tokio::test]
    async fn test_password_grant_failures_look_alike() {
        let (engine, directory) = engine();

        let wrong_password = engine
            .password_grant("user001", "nope", None, None)
            .await
            .unwrap_err();
        let unknown_account = engine
            .password_grant("nobody", "pw", None, None)
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_account, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_account.to_string());
        assert_eq!(directory.last_authenticated("user001"), None);
    }

    #[tokio::test]
    async fn test_public_key_response() {
        let (engine, _) = engine();
        let response = engine.public_key_response();
        assert_eq!(response.cell_url, CELL);
        assert_eq!(
            response.public_key,
            CellKeyPair::from_seed([7u8; 32]).public().to_string()
        );
    }
}
