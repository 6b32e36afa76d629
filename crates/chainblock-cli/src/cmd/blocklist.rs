use crate::output::{print_json, print_table};
use crate::settings::load_config;
use chainblock_core::blocklist;
use chainblock_core::config::SessionConfig;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum BlocklistSubcommand {
    /// Parse one or more import files and report what would be imported
    Parse {
        /// Files with one id per line, or `{"users":[{"id":...}]}` JSON
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Stop after this many unique ids (default: session.max_user_limit)
        #[arg(long)]
        max: Option<usize>,
        /// Also print every parsed id
        #[arg(long)]
        ids: bool,
    },
}

pub fn run(config_path: &Path, subcmd: BlocklistSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        BlocklistSubcommand::Parse { files, max, ids } => parse(config_path, &files, max, ids, json),
    }
}

/// The configured limit when a config file exists, the built-in one otherwise.
fn max_user_limit(config_path: &Path) -> anyhow::Result<usize> {
    if config_path.exists() {
        Ok(load_config(config_path)?.session.max_user_limit)
    } else {
        Ok(SessionConfig::default().max_user_limit)
    }
}

fn parse(
    config_path: &Path,
    files: &[PathBuf],
    max: Option<usize>,
    show_ids: bool,
    json: bool,
) -> anyhow::Result<()> {
    let max = match max {
        Some(m) => m,
        None => max_user_limit(config_path)?,
    };
    let list = blocklist::parse_files(files, max)?;

    if json {
        let mut value = serde_json::json!({
            "count": list.len(),
            "duplicated": list.duplicated,
            "invalid": list.invalid,
            "limit_reached": list.len() >= max,
        });
        if show_ids {
            value["user_ids"] = serde_json::json!(list.user_ids);
        }
        return print_json(&value);
    }

    print_table(
        &["UNIQUE", "DUPLICATED", "INVALID"],
        vec![vec![
            list.len().to_string(),
            list.duplicated.to_string(),
            list.invalid.to_string(),
        ]],
    );
    if list.len() >= max {
        println!("limit of {max} ids reached; the rest was not read");
    }
    if show_ids {
        for id in &list.user_ids {
            println!("{id}");
        }
    }
    Ok(())
}
