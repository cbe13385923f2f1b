use chrono::Utc;
use tracing::info;

use crate::codec::encode_token;
use crate::keys::TokenSigner;
use crate::token::{new_rotation_id, Claims, Token};
use crate::url::normalize_cell_url;

/// TokenTimeConfig allows control over token creation times and durations
#[derive(Debug, Clone, Copy)]
pub struct TokenTimeConfig {
    /// Optional custom start time (now time override)
    pub start_time: Option<i64>,
    /// Duration in seconds (default: 3600 seconds = 1 hour)
    pub duration: i64,
}

impl Default for TokenTimeConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            duration: 3600,
        }
    }
}

impl TokenTimeConfig {
    pub fn with_duration(duration: i64) -> Self {
        Self {
            start_time: None,
            duration,
        }
    }

    pub fn at(start_time: i64, duration: i64) -> Self {
        Self {
            start_time: Some(start_time),
            duration,
        }
    }
}

impl Claims {
    /// Claims issued by `issuer` for `subject` with no schema, no roles and default timing.
    pub fn new(issuer: &str, subject: impl Into<String>) -> Self {
        Self::new_with_time(issuer, subject, TokenTimeConfig::default())
    }

    pub fn new_with_time(issuer: &str, subject: impl Into<String>, time: TokenTimeConfig) -> Self {
        Self {
            issuer: normalize_cell_url(issuer),
            subject: subject.into(),
            schema: None,
            roles: Vec::new(),
            issued_at: time.start_time.unwrap_or_else(|| Utc::now().timestamp()),
            lifetime: time.duration,
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema.map(|s| normalize_cell_url(&s));
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

impl Token {
    pub fn local_access(claims: Claims) -> Self {
        Token::LocalAccess { claims }
    }

    /// A local refresh token with a fresh rotation identifier.
    pub fn local_refresh(claims: Claims) -> Self {
        Token::LocalRefresh {
            claims,
            rotation_id: new_rotation_id(),
        }
    }

    pub fn trans_cell_access(claims: Claims, audience: &str) -> Self {
        Token::TransCellAccess {
            claims,
            audience: normalize_cell_url(audience),
        }
    }

    /// A trans-cell refresh token with a fresh rotation identifier.
    pub fn trans_cell_refresh(claims: Claims) -> Self {
        Token::TransCellRefresh {
            claims,
            rotation_id: new_rotation_id(),
        }
    }
}

/// Seal and encode a token, logging the issuance.
///
/// # Arguments
///
/// * `token` - The token to issue
/// * `signer` - The issuing cell's key
///
/// # Returns
///
/// The encoded token string, ready to hand to a client
pub fn mint_token(token: &Token, signer: &dyn TokenSigner) -> String {
    let claims = token.claims();
    info!(
        kind = %token.kind(),
        issuer = %claims.issuer,
        subject = %claims.subject,
        audience = token.audience().unwrap_or("-"),
        roles = claims.roles.len(),
        expires_at = claims.expires_at(),
        "token minted"
    );
    encode_token(token, signer)
}
