use cellauth_token::Token;

/// Resolved identity of one inbound request.
///
/// Built only from a token that has already been verified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessContext {
    pub subject: String,
    pub issuer: String,
    pub schema: Option<String>,
    pub roles: Vec<String>,
}

impl AccessContext {
    pub fn new(subject: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            schema: None,
            roles: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
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

    pub fn from_token(token: &Token) -> Self {
        let claims = token.claims();
        Self {
            subject: claims.subject.clone(),
            issuer: claims.issuer.clone(),
            schema: claims.schema.clone(),
            roles: claims.roles.clone(),
        }
    }

    pub fn has_role(&self, role_url: &str) -> bool {
        self.roles.iter().any(|role| role == role_url)
    }
}

impl From<&Token> for AccessContext {
    fn from(token: &Token) -> Self {
        Self::from_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellauth_token::{Claims, TokenTimeConfig};

    #[test]
    fn test_from_token_copies_identity() {
        let claims = Claims::new_with_time(
            "https://example.com/cell1",
            "https://example.com/cell1/#user001",
            TokenTimeConfig::at(0, 60),
        )
        .with_schema(Some("https://app.example/".into()))
        .with_roles(["https://example.com/cell1/__role/__/admin"]);
        let token = Token::trans_cell_access(claims, "https://example.com/cell2/");

        let context = AccessContext::from_token(&token);
        assert_eq!(context.subject, "https://example.com/cell1/#user001");
        assert_eq!(context.issuer, "https://example.com/cell1/");
        assert_eq!(context.schema.as_deref(), Some("https://app.example/"));
        assert!(context.has_role("https://example.com/cell1/__role/__/admin"));
        assert!(!context.has_role("admin"));
        assert_eq!(AccessContext::from(&token), context);
    }
}
