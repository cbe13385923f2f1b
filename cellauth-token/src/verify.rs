use chrono::Utc;
use tracing::debug;

use crate::codec::UnverifiedToken;
use crate::error::ParseError;
use crate::keys::TokenVerifier;
use crate::token::{Token, TokenKind};
use crate::url::normalize_cell_url;

impl UnverifiedToken {
    /// Verify the token as received by `receiving_cell` at time `now`.
    ///
    /// `verifier` must be the receiving cell's own key for local kinds and
    /// the claimed issuer's published key for signed kinds.
    ///
    /// Local kinds check the issuer scope before touching the key, so a
    /// local token presented elsewhere is always `WrongIssuer`. Signed kinds
    /// check the seal first, so tampering reports `SignatureInvalid` at every
    /// cell. Expiry is checked last.
    pub fn verify(
        self,
        receiving_cell: &str,
        verifier: &dyn TokenVerifier,
        now: i64,
    ) -> Result<Token, ParseError> {
        let receiving_cell = normalize_cell_url(receiving_cell);
        let kind = self.kind();

        if kind.is_signed() {
            self.check_seal(verifier)?;
            self.check_scope(&receiving_cell)?;
        } else {
            self.check_scope(&receiving_cell)?;
            self.check_seal(verifier)?;
        }

        let claims = self.token.claims();
        if claims.is_expired_at(now) {
            debug!(kind = %kind, issuer = %claims.issuer, "token expired");
            return Err(ParseError::Expired {
                expired_at: claims.expires_at(),
            });
        }

        Ok(self.token)
    }

    fn check_seal(&self, verifier: &dyn TokenVerifier) -> Result<(), ParseError> {
        if verifier.verify(self.signed_part.as_bytes(), &self.seal) {
            Ok(())
        } else {
            debug!(kind = %self.kind(), issuer = %self.issuer(), "token seal rejected");
            Err(ParseError::SignatureInvalid)
        }
    }

    fn check_scope(&self, receiving_cell: &str) -> Result<(), ParseError> {
        match self.kind() {
            TokenKind::TransCellAccess => {
                let audience = self.token.audience().unwrap_or_default();
                if normalize_cell_url(audience) != receiving_cell {
                    return Err(ParseError::WrongAudience {
                        expected: receiving_cell.to_string(),
                        actual: audience.to_string(),
                    });
                }
            }
            TokenKind::LocalAccess | TokenKind::LocalRefresh | TokenKind::TransCellRefresh => {
                if normalize_cell_url(self.issuer()) != receiving_cell {
                    return Err(ParseError::WrongIssuer {
                        expected: receiving_cell.to_string(),
                        actual: self.issuer().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Decode and fully verify a token string at `receiving_cell`, using the current time.
///
/// # Arguments
///
/// * `token_string` - Encoded token as produced by [`encode_token`](crate::encode_token)
/// * `receiving_cell` - URL of the cell the token was presented to
/// * `verifier` - Key to check the seal with (see [`UnverifiedToken::verify`])
pub fn decode_token(
    token_string: &str,
    receiving_cell: &str,
    verifier: &dyn TokenVerifier,
) -> Result<Token, ParseError> {
    decode_token_at(token_string, receiving_cell, verifier, Utc::now().timestamp())
}

/// Same as [`decode_token`] with an explicit clock.
pub fn decode_token_at(
    token_string: &str,
    receiving_cell: &str,
    verifier: &dyn TokenVerifier,
    now: i64,
) -> Result<Token, ParseError> {
    UnverifiedToken::parse(token_string)?.verify(receiving_cell, verifier, now)
}
