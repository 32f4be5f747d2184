use clap::{Args, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::time::Duration;

use docval::artifact::DocumentArtifacts;
use docval::cancel::CancelToken;
use docval::config::DocvalConfig;
use docval::context::SkippedDocument;
use docval::dispatch::{self, Backend};
use docval::executor::SystemExecutor;
use docval::log_status;
use docval::report::{Report, ReportSummary};
use docval::ErrorCode;

use super::extract::walk_input;
use super::CmdResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CommandType {
    Kubectl,
    Pxctl,
}

impl From<CommandType> for Backend {
    fn from(value: CommandType) -> Self {
        match value {
            CommandType::Kubectl => Backend::Kubectl,
            CommandType::Pxctl => Backend::Pxctl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Args)]
pub struct RunArgs {
    /// Markdown file or directory of markdown files
    pub path: String,

    /// Kubeconfig exported as KUBECONFIG to local commands
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<String>,

    /// Node that runs storage CLI commands over SSH
    #[arg(long, visible_alias = "ipaddr", value_name = "HOST")]
    pub remote_host: Option<String>,

    /// Only run commands for this tool
    #[arg(long, value_enum)]
    pub command_type: Option<CommandType>,

    /// Per-command deadline in seconds (0 disables)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Deadline for the whole run in seconds
    #[arg(long)]
    pub max_run_secs: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    command: String,
    input: String,
    artifact_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_host: Option<String>,
    documents: Vec<DocumentArtifacts>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<SkippedDocument>,
    summary: ReportSummary,
    report: Report,
}

pub fn is_text(args: &RunArgs) -> bool {
    args.format == OutputFormat::Text
}

pub fn run(args: RunArgs, global: &crate::commands::GlobalArgs) -> CmdResult<RunOutput> {
    let output = execute_run(args, global)?;
    let exit_code = if output.report.has_failures() { 1 } else { 0 };
    Ok((output, exit_code))
}

pub fn run_text(args: RunArgs, global: &crate::commands::GlobalArgs) -> CmdResult<String> {
    let output = execute_run(args, global)?;
    let exit_code = if output.report.has_failures() { 1 } else { 0 };

    let mut text = String::new();
    for skipped in &output.skipped {
        let _ = writeln!(text, "Skip  {}  {}", skipped.path, skipped.message);
    }
    text.push_str(&output.report.render());
    Ok((text, exit_code))
}

/// Merge CLI flags over the loaded config.
fn resolve_config(args: &RunArgs, global: &crate::commands::GlobalArgs) -> docval::Result<DocvalConfig> {
    let mut config = docval::config::load(global.config.as_deref())?;

    if let Some(host) = &args.remote_host {
        config.remote.host = Some(host.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config.execution.command_timeout_secs = secs;
        config.execution.remote_timeout_secs = secs;
    }
    Ok(config)
}

fn cancel_token(max_run_secs: Option<u64>) -> CancelToken {
    match max_run_secs {
        Some(secs) if secs > 0 => CancelToken::with_deadline(Duration::from_secs(secs)),
        _ => CancelToken::new(),
    }
}

fn execute_run(args: RunArgs, global: &crate::commands::GlobalArgs) -> docval::Result<RunOutput> {
    let config = resolve_config(&args, global)?;
    let cancel = cancel_token(args.max_run_secs);

    let ctx = walk_input(&args.path, &config.docs, &cancel)?
        .with_remote_host(config.remote.host.clone())
        .with_target_filter(args.command_type.map(Backend::from));

    let executor = SystemExecutor::new(&config).with_kubeconfig(args.kubeconfig.as_deref());
    let mut report = Report::new();

    log_status!(
        "run",
        "Run {}: {} manifests, {} scripts",
        report.run_id(),
        ctx.yaml_artifacts.len(),
        ctx.script_artifacts.len()
    );

    if let Err(mut err) = dispatch::execute(&ctx, &mut report, &executor, &config.tools, &cancel) {
        if err.code == ErrorCode::RunCancelled {
            if let Value::Object(details) = &mut err.details {
                details.insert(
                    "report".to_string(),
                    serde_json::to_value(&report).unwrap_or_default(),
                );
            }
        }
        return Err(err);
    }

    let summary = report.summary();
    log_status!(
        "run",
        "{} results: {} passed, {} failed",
        summary.total,
        summary.passed,
        summary.failed
    );

    Ok(RunOutput {
        command: "run".to_string(),
        input: args.path,
        artifact_root: ctx.artifact_root.display().to_string(),
        remote_host: ctx.remote_host.clone(),
        documents: ctx.documents,
        skipped: ctx.skipped,
        summary,
        report,
    })
}
