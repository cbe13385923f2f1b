use std::time::Duration;

use thiserror::Error;

use cellauth_acl::AclError;
use cellauth_api::{ApiError, ErrorResponse};
use cellauth_config::ConfigError;
use cellauth_token::{KeyError, ParseError};

use crate::directory::DirectoryError;

/// Failure to obtain a usable public key for an issuing cell
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// The issuer could not be reached after one retry
    #[error("issuer {issuer} is unreachable: {reason}")]
    Unreachable { issuer: String, reason: String },

    /// The issuer answered, but not as a cell we accept tokens from
    #[error("issuer {issuer} is not trusted: {reason}")]
    UntrustedIssuer { issuer: String, reason: String },
}

impl TrustError {
    pub fn issuer(&self) -> &str {
        match self {
            TrustError::Unreachable { issuer, .. } | TrustError::UntrustedIssuer { issuer, .. } => {
                issuer
            }
        }
    }
}

/// Client-facing failure of a grant or of bearer authentication.
///
/// The `Display` output is safe to return to clients. It never says which
/// token check failed; the wrapped [`ParseError`] is kept for logging.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("the presented token is not valid")]
    InvalidGrant(#[from] ParseError),

    #[error("client authentication failed")]
    InvalidClient(String),

    #[error("issuer trust could not be established")]
    Trust(#[from] TrustError),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal directory failure")]
    Directory(#[from] DirectoryError),
}

impl AuthError {
    /// HTTP status the grant endpoint answers with
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidRequest(_) => 400,
            AuthError::InvalidCredentials | AuthError::InvalidGrant(_) | AuthError::InvalidClient(_) => {
                401
            }
            AuthError::Trust(TrustError::UntrustedIssuer { .. }) => 401,
            AuthError::Trust(TrustError::Unreachable { .. }) | AuthError::Timeout(_) => 503,
            AuthError::Directory(_) => 500,
        }
    }

    /// OAuth2 `error` code
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidCredentials | AuthError::InvalidGrant(_) => "invalid_grant",
            AuthError::InvalidClient(_) => "invalid_client",
            AuthError::Trust(TrustError::UntrustedIssuer { .. }) => "unauthorized_client",
            AuthError::Trust(TrustError::Unreachable { .. }) | AuthError::Timeout(_) => {
                "temporarily_unavailable"
            }
            AuthError::Directory(_) => "server_error",
        }
    }

    /// Body for the grant endpoint's error response
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.to_string()),
        }
    }
}

/// Any error raised by the cellauth crates
#[derive(Error, Debug)]
pub enum CellAuthError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Acl(#[from] AclError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_errors_do_not_leak_the_failed_check() {
        let expired = AuthError::from(ParseError::Expired { expired_at: 1 });
        let forged = AuthError::from(ParseError::SignatureInvalid);

        assert_eq!(expired.to_string(), forged.to_string());
        assert_eq!(expired.status_code(), 401);
        assert_eq!(forged.error_code(), "invalid_grant");
    }

    #[test]
    fn test_status_mapping() {
        let unreachable = AuthError::from(TrustError::Unreachable {
            issuer: "https://example.com/cell2/".into(),
            reason: "connection refused".into(),
        });
        assert_eq!(unreachable.status_code(), 503);
        assert_eq!(unreachable.error_code(), "temporarily_unavailable");

        let untrusted = AuthError::from(TrustError::UntrustedIssuer {
            issuer: "https://example.com/cell2/".into(),
            reason: "not in allow-list".into(),
        });
        assert_eq!(untrusted.status_code(), 401);

        assert_eq!(AuthError::InvalidRequest("no grant_type".into()).status_code(), 400);
        assert_eq!(AuthError::Timeout(Duration::from_secs(5)).status_code(), 503);
        assert_eq!(
            AuthError::from(DirectoryError::Backend("disk".into())).error_code(),
            "server_error"
        );
    }

    #[test]
    fn test_error_response() {
        let response = AuthError::InvalidCredentials.to_error_response();
        assert_eq!(response.error, "invalid_grant");
        assert_eq!(response.error_description.as_deref(), Some("invalid credentials"));
    }
}
