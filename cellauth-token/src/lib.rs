//! # Cellauth Token
//!
//! Token model, wire codec and signing keys for cell authentication.
//!
//! A cell issues four kinds of token. Local tokens are only ever accepted by
//! the cell that minted them. Trans-cell tokens are signed with the issuing
//! cell's Ed25519 key so any cell that can fetch that key can verify them.
//! This crate has no networking dependencies; fetching a foreign cell's key
//! is left to the caller.
//!
//! ## Features
//!
//! - Token model: a single [`Token`] enum over the four kinds
//! - Wire codec: `<tag>.<payload>.<seal>` strings, see [`encode_token`] and [`UnverifiedToken`]
//! - Pluggable seals: [`TokenSigner`] / [`TokenVerifier`], Ed25519 by default
//! - Canonical cell, account and role URLs
//!
//! ## Usage
//!
//! ```no_run
//! use cellauth_token::{decode_token, mint_token, CellKeyPair, Claims, Token};
//!
//! fn main() -> Result<(), cellauth_token::ParseError> {
//!     let cell = "https://example.com/cell1/";
//!     let keypair = CellKeyPair::generate();
//!
//!     let claims = Claims::new(cell, "https://example.com/cell1/#user001")
//!         .with_roles(["https://example.com/cell1/__role/__/admin"]);
//!     let token = mint_token(&Token::local_access(claims), &keypair);
//!
//!     let decoded = decode_token(&token, cell, &keypair.public())?;
//!     println!("roles: {:?}", decoded.roles());
//!     Ok(())
//! }
//! ```

mod codec;
mod error;
mod keys;
mod mint;
mod token;
mod url;
mod utils;
mod verify;

pub use codec::{encode_token, UnverifiedToken};
pub use error::{KeyError, ParseError};
pub use keys::{
    keypair_from_string, public_key_from_string, CellKeyPair, CellPublicKey, TokenSigner,
    TokenVerifier,
};
pub use mint::{mint_token, TokenTimeConfig};
pub use token::{Claims, Token, TokenKind};
pub use url::{account_subject, normalize_cell_url, same_cell, Role};
pub use utils::{decode_segment, encode_segment, keypair_from_file, public_key_from_file};
pub use verify::{decode_token, decode_token_at};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CELL_A: &str = "https://example.com/cellA/";
    const CELL_B: &str = "https://example.com/cellB/";
    const NOW: i64 = 1_700_000_000;

    fn claims() -> Claims {
        Claims::new_with_time(
            CELL_A,
            account_subject(CELL_A, "user001"),
            TokenTimeConfig::at(NOW, 3600),
        )
        .with_roles([Role::new(CELL_A, None, "roleX").url()])
    }

    fn all_kinds() -> Vec<Token> {
        vec![
            Token::local_access(claims()),
            Token::local_refresh(claims().with_schema(Some("https://app.example".into()))),
            Token::trans_cell_access(claims(), CELL_B),
            Token::trans_cell_refresh(claims()),
        ]
    }

    /// Cell a token of this kind must be presented to.
    fn receiver(token: &Token) -> &str {
        token.audience().unwrap_or(CELL_A)
    }

    #[test]
    fn test_round_trip_every_kind() {
        let keypair = CellKeyPair::generate();
        for token in all_kinds() {
            let encoded = mint_token(&token, &keypair);
            let decoded =
                decode_token_at(&encoded, receiver(&token), &keypair.public(), NOW + 10).unwrap();
            assert_eq!(decoded, token);
        }
    }

    #[test]
    fn test_schema_is_normalized() {
        let token = &all_kinds()[1];
        assert_eq!(token.schema(), Some("https://app.example/"));
    }

    #[test]
    fn test_tampered_seal_fails_everywhere() {
        let keypair = CellKeyPair::generate();
        let token = Token::trans_cell_access(claims(), CELL_B);
        let encoded = mint_token(&token, &keypair);

        let (body, seal) = encoded.rsplit_once('.').unwrap();
        let mut seal = decode_segment(seal).unwrap();
        for index in [0, 17, 63] {
            seal[index] ^= 0x01;
            let tampered = format!("{}.{}", body, encode_segment(&seal));
            for cell in [CELL_A, CELL_B, "https://example.com/cellC/"] {
                assert_eq!(
                    decode_token_at(&tampered, cell, &keypair.public(), NOW),
                    Err(ParseError::SignatureInvalid),
                    "byte {index} at {cell}"
                );
            }
            seal[index] ^= 0x01;
        }
    }

    #[test]
    fn test_tampered_payload_fails() {
        let keypair = CellKeyPair::generate();
        let token = Token::trans_cell_access(claims(), CELL_B);
        let encoded = mint_token(&token, &keypair);
        let parts: Vec<&str> = encoded.split('.').collect();

        let mut forged = token.clone();
        if let Token::TransCellAccess { claims, .. } = &mut forged {
            claims.roles.push(Role::new(CELL_A, None, "admin").url());
        }
        let forged_parts: Vec<String> = mint_token(&forged, &CellKeyPair::generate())
            .split('.')
            .map(str::to_string)
            .collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        assert_eq!(
            decode_token_at(&spliced, CELL_B, &keypair.public(), NOW),
            Err(ParseError::SignatureInvalid)
        );
    }

    #[test]
    fn test_local_token_at_other_cell_is_wrong_issuer() {
        let keypair = CellKeyPair::generate();
        for token in [
            Token::local_access(claims()),
            Token::local_refresh(claims()),
        ] {
            let encoded = mint_token(&token, &keypair);
            // Even with the right key, the scope check comes first
            let result = decode_token_at(&encoded, CELL_B, &keypair.public(), NOW);
            assert!(
                matches!(result, Err(ParseError::WrongIssuer { .. })),
                "{result:?}"
            );
        }
    }

    #[test]
    fn test_local_token_with_foreign_key_is_signature_invalid() {
        let keypair = CellKeyPair::generate();
        let encoded = mint_token(&Token::local_access(claims()), &keypair);
        assert_eq!(
            decode_token_at(&encoded, CELL_A, &CellKeyPair::generate().public(), NOW),
            Err(ParseError::SignatureInvalid)
        );
    }

    #[test]
    fn test_trans_cell_access_wrong_audience() {
        let keypair = CellKeyPair::generate();
        let encoded = mint_token(&Token::trans_cell_access(claims(), CELL_B), &keypair);
        let result = decode_token_at(&encoded, "https://example.com/cellC", &keypair.public(), NOW);
        assert_eq!(
            result,
            Err(ParseError::WrongAudience {
                expected: "https://example.com/cellC/".to_string(),
                actual: CELL_B.to_string(),
            })
        );
    }

    #[test]
    fn test_trans_cell_refresh_only_at_issuer() {
        let keypair = CellKeyPair::generate();
        let encoded = mint_token(&Token::trans_cell_refresh(claims()), &keypair);
        assert!(decode_token_at(&encoded, CELL_A, &keypair.public(), NOW).is_ok());
        assert!(matches!(
            decode_token_at(&encoded, CELL_B, &keypair.public(), NOW),
            Err(ParseError::WrongIssuer { .. })
        ));
    }

    #[test]
    fn test_expired() {
        let keypair = CellKeyPair::generate();
        let encoded = mint_token(&Token::local_access(claims()), &keypair);

        assert!(decode_token_at(&encoded, CELL_A, &keypair.public(), NOW + 3600).is_ok());
        assert_eq!(
            decode_token_at(&encoded, CELL_A, &keypair.public(), NOW + 3601),
            Err(ParseError::Expired {
                expired_at: NOW + 3600
            })
        );
    }

    #[test]
    fn test_expired_token_with_bad_seal_reports_seal() {
        let keypair = CellKeyPair::generate();
        let encoded = mint_token(&Token::trans_cell_access(claims(), CELL_B), &keypair);
        assert_eq!(
            decode_token_at(&encoded, CELL_B, &CellKeyPair::generate().public(), NOW + 99_999),
            Err(ParseError::SignatureInvalid)
        );
    }

    #[test]
    fn test_keys_from_files() {
        let keypair = CellKeyPair::generate();

        let mut private_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(private_file, "{}", keypair.to_key_string()).unwrap();
        let mut public_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(public_file, "{}", keypair.public()).unwrap();

        let restored = keypair_from_file(private_file.path()).unwrap();
        assert_eq!(restored.public(), keypair.public());
        assert_eq!(
            public_key_from_file(public_file.path()).unwrap(),
            keypair.public()
        );
        assert!(matches!(
            public_key_from_file("/nonexistent/cell.pub"),
            Err(KeyError::Io(_))
        ));
    }
}
