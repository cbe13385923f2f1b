use thiserror::Error;

/// Reasons a token string cannot be turned into a trusted [`Token`](crate::Token).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The string does not have the structure of a cell token.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// `issued_at + lifetime` lies in the past.
    #[error("token expired at {expired_at}")]
    Expired { expired_at: i64 },

    /// A trans-cell token was presented to a cell it was not minted for.
    #[error("token audience {actual} does not match receiving cell {expected}")]
    WrongAudience { expected: String, actual: String },

    /// A cell-scoped token was presented to a cell other than its issuer.
    #[error("token issued by {actual} cannot be used at {expected}")]
    WrongIssuer { expected: String, actual: String },

    /// The seal does not verify against the issuer's key.
    #[error("token signature is invalid")]
    SignatureInvalid,
}

impl ParseError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ParseError::Malformed(message.into())
    }

    /// Short machine-readable name of the failure, suitable for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::Malformed(_) => "malformed",
            ParseError::Expired { .. } => "expired",
            ParseError::WrongAudience { .. } => "wrong_audience",
            ParseError::WrongIssuer { .. } => "wrong_issuer",
            ParseError::SignatureInvalid => "signature_invalid",
        }
    }
}

/// Errors raised while reading key material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid key format: {0}")]
    InvalidFormat(String),

    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("failed to read key: {0}")]
    Io(String),
}

impl KeyError {
    pub fn invalid_format(message: impl Into<String>) -> Self {
        KeyError::InvalidFormat(message.into())
    }
}

impl From<hex::FromHexError> for KeyError {
    fn from(error: hex::FromHexError) -> Self {
        KeyError::InvalidFormat(format!("key is not valid hex: {error}"))
    }
}
