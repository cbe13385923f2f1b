use colored::Colorize;
use serde_json::json;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use cellauth_acl::{parse_acl, to_json, to_xml, AccessContext, Acl, AclEvaluator, AclLevel};

use crate::cli::{AclCommands, Format};
use crate::error::{CliError, Result};

pub fn handle_acl_command(command: AclCommands, json_output: bool) -> Result<()> {
    let evaluator = AclEvaluator::default();

    match command {
        AclCommands::Validate { file, level } => {
            let acl = load(&file)?;
            let level = AclLevel::from(level);
            let result = evaluator.validate(&acl, level);

            if json_output {
                let output = json!({
                    "valid": result.is_ok(),
                    "level": level.to_string(),
                    "aces": acl.effective_aces().count(),
                    "error": result.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if let Err(e) = &result {
                eprintln!("{} {} is not a valid {level} ACL", "✗".red().bold(), file.display());
                eprintln!("  Error: {e}");
            } else {
                println!("{} {} is a valid {level} ACL", "✓".green().bold(), file.display());
                println!("  Entries: {}", acl.effective_aces().count());
            }
            result.map_err(CliError::from)
        }

        AclCommands::Convert { file, to } => {
            let acl = load(&file)?;
            println!("{}", convert(&acl, to)?);
            Ok(())
        }

        AclCommands::Check {
            file,
            level,
            privilege,
            roles,
            schema,
        } => {
            let acl = load(&file)?;
            let level = AclLevel::from(level);
            let context = AccessContext::new("-", "-")
                .with_roles(roles)
                .with_schema(schema);
            let (allowed, granted) = check(&evaluator, &acl, &context, &privilege, level)?;

            if json_output {
                let output = json!({
                    "allowed": allowed,
                    "privilege": privilege,
                    "level": level.to_string(),
                    "schema_satisfied": acl.schema_permits(&context),
                    "granted": granted,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                let mark = if allowed {
                    "✓".green().bold()
                } else {
                    "✗".red().bold()
                };
                println!(
                    "{mark} {privilege} is {}",
                    if allowed { "granted" } else { "denied" }
                );
                if !acl.schema_permits(&context) {
                    println!("  Schema requirement not met");
                }
                let granted: Vec<_> = granted.into_iter().collect();
                println!(
                    "  Granted: {}",
                    if granted.is_empty() {
                        "(nothing)".to_string()
                    } else {
                        granted.join(", ")
                    }
                );
            }

            if allowed {
                Ok(())
            } else {
                Err(CliError::Denied(format!("{privilege} is not granted")))
            }
        }
    }
}

fn load(path: &Path) -> Result<Acl> {
    debug!(path = %path.display(), "loading ACL document");
    let document = fs::read_to_string(path)?;
    Ok(parse_acl(&document)?)
}

fn convert(acl: &Acl, to: Format) -> Result<String> {
    match to {
        Format::Xml => Ok(to_xml(acl)?),
        Format::Json => Ok(to_json(acl)),
    }
}

/// Validate, then evaluate. Returns the decision and the privileges the
/// context's roles are granted.
fn check(
    evaluator: &AclEvaluator,
    acl: &Acl,
    context: &AccessContext,
    privilege: &str,
    level: AclLevel,
) -> Result<(bool, BTreeSet<String>)> {
    evaluator.validate(acl, level)?;
    let allowed = evaluator.authorize(acl, context, privilege, level);
    Ok((allowed, evaluator.granted_privileges(acl, context)))
}
