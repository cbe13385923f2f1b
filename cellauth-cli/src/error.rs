use thiserror::Error;

use cellauth_acl::AclError;
use cellauth_config::ConfigError;
use cellauth_token::{KeyError, ParseError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Token error: {0}")]
    Token(#[from] ParseError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("ACL error: {0}")]
    Acl(#[from] AclError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Access denied: {0}")]
    Denied(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
