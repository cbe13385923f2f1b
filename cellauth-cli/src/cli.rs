use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use cellauth_acl::AclLevel;

#[derive(Parser)]
#[command(
    name = "cellauth",
    version,
    about = "Operator tooling for cell keys, tokens and access control lists",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cell signing keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Token inspection
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Access control lists
    Acl {
        #[command(subcommand)]
        command: AclCommands,
    },

    /// Cell configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate a new cell signing key
    Generate {
        /// Write the signing key to this file instead of printing it
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Show the contents of a token without verifying it
    Inspect {
        /// Token string (reads stdin if omitted)
        token: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AclCommands {
    /// Check that an ACL document is well formed
    Validate {
        /// XML or JSON ACL document
        file: PathBuf,

        /// Vocabulary the ACL's privileges must come from
        #[arg(long, value_enum, default_value = "box")]
        level: Level,
    },

    /// Convert an ACL document between XML and JSON
    Convert {
        file: PathBuf,

        #[arg(long, value_enum)]
        to: Format,
    },

    /// Evaluate an ACL for an ad-hoc identity
    Check {
        file: PathBuf,

        #[arg(long, value_enum, default_value = "box")]
        level: Level,

        /// Privilege being requested
        #[arg(short, long)]
        privilege: String,

        /// Role URL held by the identity (repeatable)
        #[arg(short, long = "role")]
        roles: Vec<String>,

        /// Client schema URL of the identity
        #[arg(long)]
        schema: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Load and validate a cell configuration
    Check {
        /// JSON or TOML file (default search locations if omitted)
        #[arg(short, long, env = "CELLAUTH_CONFIG")]
        file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Level {
    Cell,
    Box,
}

impl From<Level> for AclLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Cell => AclLevel::Cell,
            Level::Box => AclLevel::Box,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Format {
    Xml,
    Json,
}
