use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::{json, Value};
use std::io::{self, Read};

use cellauth_token::UnverifiedToken;

use crate::cli::TokenCommands;
use crate::error::{CliError, Result};

pub fn handle_token_command(command: TokenCommands, json_output: bool) -> Result<()> {
    match command {
        TokenCommands::Inspect { token } => {
            let token = match token {
                Some(token) => token,
                None => {
                    let mut buffer = String::new();
                    io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            let token = token.trim();
            if token.is_empty() {
                return Err(CliError::InvalidInput(
                    "No token provided. Pass it as an argument or pipe it to stdin".into(),
                ));
            }

            let details = inspect(token, Utc::now().timestamp())?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&details)?);
            } else {
                print_details(&details);
            }
            Ok(())
        }
    }
}

/// Unverified view of a token at time `now`.
fn inspect(token: &str, now: i64) -> Result<Value> {
    let unverified = UnverifiedToken::parse(token)?;
    let token = unverified.claims_unverified();
    let claims = token.claims();

    Ok(json!({
        "kind": token.kind().to_string(),
        "issuer": claims.issuer,
        "subject": claims.subject,
        "schema": claims.schema,
        "roles": claims.roles,
        "audience": token.audience(),
        "rotation_id": token.rotation_id(),
        "issued_at": timestamp(claims.issued_at),
        "expires_at": timestamp(claims.expires_at()),
        "expired": claims.is_expired_at(now),
        "verified": false,
    }))
}

fn timestamp(seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| seconds.to_string())
}

fn print_details(details: &Value) {
    let field = |name: &str| match &details[name] {
        Value::String(value) => value.clone(),
        Value::Null => "(none)".to_string(),
        other => other.to_string(),
    };

    println!("{} {} token (not verified)", "!".yellow(), field("kind"));
    println!("  Issuer:   {}", field("issuer"));
    println!("  Subject:  {}", field("subject"));
    println!("  Schema:   {}", field("schema"));
    println!("  Audience: {}", field("audience"));
    if !details["rotation_id"].is_null() {
        println!("  Rotation: {}", field("rotation_id"));
    }
    println!("  Issued:   {}", field("issued_at"));
    if details["expired"].as_bool().unwrap_or(false) {
        println!("  Expires:  {} {}", field("expires_at"), "(expired)".red());
    } else {
        println!("  Expires:  {}", field("expires_at"));
    }
    match details["roles"].as_array() {
        Some(roles) if !roles.is_empty() => {
            println!("  Roles:");
            for role in roles {
                println!("    - {}", role.as_str().unwrap_or_default());
            }
        }
        _ => println!("  Roles:    (none)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellauth_token::{mint_token, CellKeyPair, Claims, Token, TokenTimeConfig};

    #[test]
    fn test_inspect() {
        let claims = Claims::new_with_time(
            "https://example.com/cell1",
            "https://example.com/cell1/#user001",
            TokenTimeConfig::at(1_700_000_000, 60),
        )
        .with_roles(["https://example.com/cell1/__role/__/reader"]);
        let token = mint_token(
            &Token::trans_cell_access(claims, "https://example.com/cell2"),
            &CellKeyPair::generate(),
        );

        let details = inspect(&token, 1_700_000_030).unwrap();
        assert_eq!(details["kind"], "trans-cell access");
        assert_eq!(details["issuer"], "https://example.com/cell1/");
        assert_eq!(details["audience"], "https://example.com/cell2/");
        assert_eq!(details["schema"], Value::Null);
        assert_eq!(details["expires_at"], "2023-11-14T22:14:20+00:00");
        assert_eq!(details["expired"], false);

        let details = inspect(&token, 1_700_000_061).unwrap();
        assert_eq!(details["expired"], true);
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(matches!(
            inspect("not-a-token", 0),
            Err(CliError::Token(_))
        ));
    }
}
