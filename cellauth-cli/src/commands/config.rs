use colored::Colorize;
use serde_json::json;
use std::path::Path;

use cellauth_config::{try_load_default_config, CellConfig};

use crate::cli::ConfigCommands;
use crate::error::{CliError, Result};

pub fn handle_config_command(command: ConfigCommands, json_output: bool) -> Result<()> {
    match command {
        ConfigCommands::Check { file } => {
            let config = match &file {
                Some(path) => load(path)?,
                None => try_load_default_config().ok_or_else(|| {
                    CliError::InvalidInput(
                        "No configuration found. Set CELLAUTH_* variables, create ./cellauth.json or pass --file"
                            .into(),
                    )
                })?,
            };
            let public_key = config.keypair()?.public().to_string();

            if json_output {
                let output = json!({
                    "valid": true,
                    "cell_url": config.cell_url,
                    "public_key": public_key,
                    "public_key_url": config.public_key_url(&config.cell_url),
                    "access_token_lifetime": config.access_token_lifetime,
                    "refresh_token_lifetime": config.refresh_token_lifetime,
                    "key_cache_ttl": config.key_cache_ttl,
                    "trusted_issuers": config.trusted_issuers,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{} Configuration is valid", "✓".green().bold());
                println!("  Cell:        {}", config.cell_url);
                println!("  Public key:  {public_key}");
                println!("  Served at:   {}", config.public_key_url(&config.cell_url));
                println!(
                    "  Lifetimes:   access {}s, refresh {}s",
                    config.access_token_lifetime, config.refresh_token_lifetime
                );
                match &config.trusted_issuers {
                    Some(issuers) => println!("  Trusts:      {}", issuers.join(", ")),
                    None => println!("  Trusts:      any cell"),
                }
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<CellConfig> {
    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => CellConfig::from_toml(path)?,
        _ => CellConfig::from_file(path)?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellauth_token::CellKeyPair;
    use std::fs;

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let key = CellKeyPair::from_seed([5; 32]).to_key_string();

        let json_path = dir.path().join("cell.json");
        fs::write(
            &json_path,
            format!(r#"{{"cell_url": "https://example.com/cell1", "signing_key": "{key}"}}"#),
        )
        .unwrap();
        assert_eq!(load(&json_path).unwrap().cell_url, "https://example.com/cell1/");

        let toml_path = dir.path().join("cell.toml");
        fs::write(
            &toml_path,
            format!("cell_url = \"https://example.com/cell2\"\nsigning_key = \"{key}\"\n"),
        )
        .unwrap();
        assert_eq!(load(&toml_path).unwrap().cell_url, "https://example.com/cell2/");

        fs::write(&json_path, r#"{"cell_url": "https://example.com/cell1"}"#).unwrap();
        assert!(matches!(load(&json_path), Err(CliError::Config(_))));
    }
}
