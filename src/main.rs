use clap::{Parser, Subcommand};

use commands::GlobalArgs;

#[derive(Debug, Clone, Copy)]
enum ResponseMode {
    Json,
    Raw(RawOutputMode),
}

#[derive(Debug, Clone, Copy)]
enum RawOutputMode {
    Text,
}

mod commands;
mod output;
mod tty;

use commands::{config, extract, run};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "docval")]
#[command(version = VERSION)]
#[command(about = "Validate documentation by executing its yaml and bash snippets")]
struct Cli {
    /// Config file to use instead of ~/.config/docval/docval.json
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract snippets, apply manifests and run commands
    Run(run::RunArgs),
    /// Extract snippets into artifacts without executing anything
    Extract(extract::ExtractArgs),
    /// Inspect docval configuration
    Config(config::ConfigArgs),
}

fn response_mode(command: &Commands) -> ResponseMode {
    match command {
        Commands::Run(args) if run::is_text(args) => ResponseMode::Raw(RawOutputMode::Text),
        _ => ResponseMode::Json,
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs { config: cli.config };
    let mode = response_mode(&cli.command);

    if let ResponseMode::Raw(RawOutputMode::Text) = mode {
        let text_result = commands::run_text(cli.command, &global);

        match text_result {
            Ok((content, exit_code)) => {
                print!("{}", content);
                return std::process::ExitCode::from(exit_code_to_u8(exit_code));
            }
            Err(err) => {
                let exit_code = output::exit_code_for_error(err.code);
                let _ = output::print_result::<serde_json::Value>(Err(err));
                return std::process::ExitCode::from(exit_code_to_u8(exit_code));
            }
        }
    }

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
