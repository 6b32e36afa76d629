use crate::output::print_json;
use crate::settings::{config_template, load_config};
use chainblock_core::WarnLevel;
use clap::Subcommand;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a config template to fill in
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the config for common mistakes
    Validate,

    /// Print the resolved config file path
    Path,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init { force } => init(config_path, force, json),
        ConfigSubcommand::Validate => validate(config_path, json),
        ConfigSubcommand::Path => {
            if json {
                print_json(&serde_json::json!({ "path": config_path }))
            } else {
                println!("{}", config_path.display());
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(config_path: &Path, force: bool, json: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    config_template().save(config_path)?;

    if json {
        print_json(&serde_json::json!({ "path": config_path }))?;
    } else {
        println!("Wrote {}", config_path.display());
        println!("Fill in api.bearer_token and the actor tokens, then run `chainblock config validate`.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
