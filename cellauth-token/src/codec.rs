use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ParseError;
use crate::keys::TokenSigner;
use crate::token::{Claims, Token, TokenKind};
use crate::utils::{decode_segment, encode_segment};

/// JSON payload keys, shared by encoder and decoder.
const ISSUER: &str = "iss";
const SUBJECT: &str = "sub";
const SCHEMA: &str = "sch";
const ROLES: &str = "roles";
const ISSUED_AT: &str = "iat";
const LIFETIME: &str = "ttl";
const AUDIENCE: &str = "aud";
const ROTATION_ID: &str = "jti";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WirePayload {
    iss: String,
    sub: String,
    #[serde(default)]
    sch: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    iat: i64,
    ttl: i64,
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    jti: Option<String>,
}

fn payload_json(token: &Token) -> Value {
    let claims = token.claims();
    let mut map = Map::new();
    map.insert(ISSUER.into(), json!(claims.issuer));
    map.insert(SUBJECT.into(), json!(claims.subject));
    if let Some(schema) = &claims.schema {
        map.insert(SCHEMA.into(), json!(schema));
    }
    map.insert(ROLES.into(), json!(claims.roles));
    map.insert(ISSUED_AT.into(), json!(claims.issued_at));
    map.insert(LIFETIME.into(), json!(claims.lifetime));
    if let Some(audience) = token.audience() {
        map.insert(AUDIENCE.into(), json!(audience));
    }
    if let Some(rotation_id) = token.rotation_id() {
        map.insert(ROTATION_ID.into(), json!(rotation_id));
    }
    Value::Object(map)
}

/// The part of the token string the seal covers: `<tag>.<payload>`.
fn signed_part(token: &Token) -> String {
    format!(
        "{}.{}",
        token.kind().tag(),
        encode_segment(payload_json(token).to_string().as_bytes())
    )
}

/// Encode a token as `<tag>.<payload>.<seal>`.
///
/// The payload is compact JSON with sorted keys, so the same token always
/// encodes to the same string for a deterministic signer.
pub fn encode_token(token: &Token, signer: &dyn TokenSigner) -> String {
    let body = signed_part(token);
    let seal = signer.sign(body.as_bytes());
    format!("{}.{}", body, encode_segment(&seal))
}

/// A token whose structure has been checked but whose seal, scope and
/// expiry have not.
///
/// Parsing first lets a verifier learn the claimed issuer, which it needs
/// to pick the key for signed kinds. Nothing read from an `UnverifiedToken`
/// should be trusted until [`UnverifiedToken::verify`] succeeds.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    pub(crate) token: Token,
    pub(crate) signed_part: String,
    pub(crate) seal: Vec<u8>,
}

impl UnverifiedToken {
    pub fn parse(token_string: &str) -> Result<Self, ParseError> {
        let mut parts = token_string.trim().split('.');
        let (Some(tag), Some(payload), Some(seal), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::malformed("expected three dot-separated segments"));
        };

        let kind = TokenKind::from_tag(tag)
            .ok_or_else(|| ParseError::malformed(format!("unknown token tag '{tag}'")))?;
        let payload_bytes = decode_segment(payload)?;
        let seal = decode_segment(seal)?;
        if seal.is_empty() {
            return Err(ParseError::malformed("empty seal"));
        }

        let wire: WirePayload = serde_json::from_slice(&payload_bytes)
            .map_err(|e| ParseError::malformed(format!("invalid payload: {e}")))?;
        let token = token_from_wire(kind, wire)?;

        Ok(Self {
            token,
            signed_part: format!("{tag}.{payload}"),
            seal,
        })
    }

    pub fn kind(&self) -> TokenKind {
        self.token.kind()
    }

    /// Issuer as claimed by the token. Unverified.
    pub fn issuer(&self) -> &str {
        self.token.issuer()
    }

    /// The decoded fields, without any verification. For inspection only.
    pub fn claims_unverified(&self) -> &Token {
        &self.token
    }
}

fn token_from_wire(kind: TokenKind, wire: WirePayload) -> Result<Token, ParseError> {
    if wire.iss.is_empty() {
        return Err(ParseError::malformed("empty issuer"));
    }
    if wire.sub.is_empty() {
        return Err(ParseError::malformed("empty subject"));
    }
    if wire.ttl < 0 {
        return Err(ParseError::malformed("negative lifetime"));
    }
    if wire.aud.is_some() && kind != TokenKind::TransCellAccess {
        return Err(ParseError::malformed(format!("{kind} token carries an audience")));
    }
    if wire.jti.is_some() && !kind.is_refresh() {
        return Err(ParseError::malformed(format!(
            "{kind} token carries a rotation id"
        )));
    }

    let claims = Claims {
        issuer: wire.iss,
        subject: wire.sub,
        schema: wire.sch,
        roles: wire.roles,
        issued_at: wire.iat,
        lifetime: wire.ttl,
    };
    let rotation_id = || {
        wire.jti
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ParseError::malformed(format!("{kind} token lacks a rotation id")))
    };

    let token = match kind {
        TokenKind::LocalAccess => Token::LocalAccess { claims },
        TokenKind::LocalRefresh => Token::LocalRefresh {
            rotation_id: rotation_id()?,
            claims,
        },
        TokenKind::TransCellAccess => Token::TransCellAccess {
            audience: wire
                .aud
                .clone()
                .filter(|aud| !aud.is_empty())
                .ok_or_else(|| ParseError::malformed("trans-cell access token lacks an audience"))?,
            claims,
        },
        TokenKind::TransCellRefresh => Token::TransCellRefresh {
            rotation_id: rotation_id()?,
            claims,
        },
    };
    Ok(token)
}
