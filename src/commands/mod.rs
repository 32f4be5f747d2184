pub type CmdResult<T> = docval::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Explicit config file (`--config`)
    pub config: Option<String>,
}

pub mod config;
pub mod extract;
pub mod run;

pub(crate) fn run_text(
    command: crate::Commands,
    global: &GlobalArgs,
) -> docval::Result<(String, i32)> {
    match command {
        crate::Commands::Run(args) => run::run_text(args, global),
        _ => Err(docval::Error::validation_invalid_argument(
            "format",
            "Command does not support text output",
        )),
    }
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (docval::Result<serde_json::Value>, i32) {
    crate::tty::status("docval is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Extract(args) => dispatch!(args, global, extract),
        crate::Commands::Config(args) => dispatch!(args, global, config),
    }
}
