use std::fmt;

use uuid::Uuid;

use crate::url::normalize_cell_url;

/// Discriminant of the four token kinds, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    LocalAccess,
    LocalRefresh,
    TransCellAccess,
    TransCellRefresh,
}

impl TokenKind {
    pub const ALL: [TokenKind; 4] = [
        TokenKind::LocalAccess,
        TokenKind::LocalRefresh,
        TokenKind::TransCellAccess,
        TokenKind::TransCellRefresh,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            TokenKind::LocalAccess => "LA",
            TokenKind::LocalRefresh => "LR",
            TokenKind::TransCellAccess => "TA",
            TokenKind::TransCellRefresh => "TR",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Signed kinds are verified with the issuer's published key.
    pub fn is_signed(&self) -> bool {
        matches!(self, TokenKind::TransCellAccess | TokenKind::TransCellRefresh)
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self, TokenKind::LocalRefresh | TokenKind::TransCellRefresh)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::LocalAccess => "local access",
            TokenKind::LocalRefresh => "local refresh",
            TokenKind::TransCellAccess => "trans-cell access",
            TokenKind::TransCellRefresh => "trans-cell refresh",
        };
        f.write_str(name)
    }
}

/// Fields shared by every token kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Cell URL that minted the token.
    pub issuer: String,
    /// Account or role URL the token speaks for.
    pub subject: String,
    /// Cell URL of the client application, when a client assertion was made.
    pub schema: Option<String>,
    /// Role URLs asserted at issuance time.
    pub roles: Vec<String>,
    /// Unix timestamp in seconds.
    pub issued_at: i64,
    /// Lifetime in seconds.
    pub lifetime: i64,
}

impl Claims {
    pub fn expires_at(&self) -> i64 {
        self.issued_at.saturating_add(self.lifetime)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at() < now
    }
}

/// A cell token. Exactly one variant per wire tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    LocalAccess {
        claims: Claims,
    },
    LocalRefresh {
        claims: Claims,
        rotation_id: String,
    },
    TransCellAccess {
        claims: Claims,
        audience: String,
    },
    TransCellRefresh {
        claims: Claims,
        rotation_id: String,
    },
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::LocalAccess { .. } => TokenKind::LocalAccess,
            Token::LocalRefresh { .. } => TokenKind::LocalRefresh,
            Token::TransCellAccess { .. } => TokenKind::TransCellAccess,
            Token::TransCellRefresh { .. } => TokenKind::TransCellRefresh,
        }
    }

    pub fn claims(&self) -> &Claims {
        match self {
            Token::LocalAccess { claims }
            | Token::LocalRefresh { claims, .. }
            | Token::TransCellAccess { claims, .. }
            | Token::TransCellRefresh { claims, .. } => claims,
        }
    }

    pub fn into_claims(self) -> Claims {
        match self {
            Token::LocalAccess { claims }
            | Token::LocalRefresh { claims, .. }
            | Token::TransCellAccess { claims, .. }
            | Token::TransCellRefresh { claims, .. } => claims,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.claims().issuer
    }

    pub fn subject(&self) -> &str {
        &self.claims().subject
    }

    pub fn schema(&self) -> Option<&str> {
        self.claims().schema.as_deref()
    }

    pub fn roles(&self) -> &[String] {
        &self.claims().roles
    }

    pub fn audience(&self) -> Option<&str> {
        match self {
            Token::TransCellAccess { audience, .. } => Some(audience),
            _ => None,
        }
    }

    pub fn rotation_id(&self) -> Option<&str> {
        match self {
            Token::LocalRefresh { rotation_id, .. } | Token::TransCellRefresh { rotation_id, .. } => {
                Some(rotation_id)
            }
            _ => None,
        }
    }

    pub fn expires_at(&self) -> i64 {
        self.claims().expires_at()
    }

    /// The same logical token re-issued at `now`.
    ///
    /// Issuer, subject, schema, roles and lifetime are kept. Refresh kinds
    /// receive a fresh rotation identifier.
    pub fn rotate(&self, now: i64) -> Token {
        let mut claims = self.claims().clone();
        claims.issued_at = now;
        match self {
            Token::LocalAccess { .. } => Token::LocalAccess { claims },
            Token::LocalRefresh { .. } => Token::LocalRefresh {
                claims,
                rotation_id: new_rotation_id(),
            },
            Token::TransCellAccess { audience, .. } => Token::TransCellAccess {
                claims,
                audience: audience.clone(),
            },
            Token::TransCellRefresh { .. } => Token::TransCellRefresh {
                claims,
                rotation_id: new_rotation_id(),
            },
        }
    }

    /// Whether the token was minted by `cell_url`.
    pub fn is_issued_by(&self, cell_url: &str) -> bool {
        self.issuer() == normalize_cell_url(cell_url)
    }
}

pub(crate) fn new_rotation_id() -> String {
    Uuid::new_v4().to_string()
}
