use clap::{Args, Subcommand};
use serde::Serialize;

use docval::config::{self, DocvalConfig};

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display configuration (merged defaults + file)
    Show {
        /// Show only built-in defaults (ignore docval.json)
        #[arg(long)]
        builtin: bool,
    },
    /// Show the path to docval.json
    Path,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<DocvalConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
}

pub fn run(args: ConfigArgs, global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { builtin } => show(builtin, global.config.as_deref()),
        ConfigCommand::Path => path(global.config.as_deref()),
    }
}

fn show(builtin: bool, explicit: Option<&str>) -> CmdResult<ConfigOutput> {
    let config = if builtin {
        DocvalConfig::default()
    } else {
        config::load(explicit)?
    };

    Ok((
        ConfigOutput {
            command: "config.show".to_string(),
            config: Some(config),
            path: None,
            exists: None,
        },
        0,
    ))
}

fn path(explicit: Option<&str>) -> CmdResult<ConfigOutput> {
    let path = config::config_path(explicit)?;
    let exists = path.exists();

    Ok((
        ConfigOutput {
            command: "config.path".to_string(),
            config: None,
            path: Some(path.display().to_string()),
            exists: Some(exists),
        },
        0,
    ))
}
