use colored::Colorize;
use serde_json::json;
use std::fs;

use cellauth_token::CellKeyPair;

use crate::cli::KeyCommands;
use crate::error::Result;

pub fn handle_key_command(command: KeyCommands, json_output: bool) -> Result<()> {
    match command {
        KeyCommands::Generate { out } => {
            let keypair = CellKeyPair::generate();
            let public_key = keypair.public().to_string();

            if let Some(path) = &out {
                fs::write(path, format!("{}\n", keypair.to_key_string()))?;
            }

            if json_output {
                let mut output = json!({ "public_key": public_key });
                match &out {
                    Some(path) => output["signing_key_file"] = json!(path),
                    None => output["signing_key"] = json!(keypair.to_key_string()),
                }
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                match &out {
                    Some(path) => println!(
                        "{} Signing key written to {}",
                        "✓".green(),
                        path.display()
                    ),
                    None => println!("Signing key: {}", keypair.to_key_string()),
                }
                println!("Public key:  {public_key}");
            }
            Ok(())
        }
    }
}
