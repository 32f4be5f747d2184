//! Execution of extracted artifacts.
//!
//! Manifests are applied first, in walk order. Script artifacts are then read
//! line by line and each line is routed by its leading word: the cluster CLI
//! runs locally, the storage CLI runs on the remote node. Every executed
//! manifest or line appends exactly one result to the report.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::config::ToolsConfig;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::io;
use crate::process::CommandOutput;
use crate::report::{CommandResult, PendingResult, Report};
use crate::ssh;

/// Where a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Cluster CLI on the local machine
    Kubectl,
    /// Storage CLI on the remote node
    Pxctl,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Kubectl => "kubectl",
            Backend::Pxctl => "pxctl",
        }
    }
}

/// Route a script line by its first whitespace-delimited word.
///
/// Lines that start with neither tool are inert and return `None`.
pub fn classify_line(line: &str, tools: &ToolsConfig) -> Option<Backend> {
    let first = line.split_whitespace().next()?;
    if first == tools.kubectl {
        Some(Backend::Kubectl)
    } else if first == tools.pxctl {
        Some(Backend::Pxctl)
    } else {
        None
    }
}

/// Apply every manifest, then run every recognized script line.
///
/// Command failures become `Fail` results. Only an unreadable script
/// artifact or cancellation returns `Err`; results recorded before that
/// stay in `report`.
pub fn execute(
    ctx: &ExecutionContext,
    report: &mut Report,
    executor: &impl Executor,
    tools: &ToolsConfig,
    cancel: &CancelToken,
) -> Result<()> {
    if ctx.allows(Backend::Kubectl) {
        apply_manifests(ctx, report, executor, cancel)?;
    }
    run_scripts(ctx, report, executor, tools, cancel)
}

fn apply_manifests(
    ctx: &ExecutionContext,
    report: &mut Report,
    executor: &impl Executor,
    cancel: &CancelToken,
) -> Result<()> {
    for manifest in &ctx.yaml_artifacts {
        if is_empty_artifact(manifest) {
            continue;
        }
        check_cancelled(cancel, "apply", report)?;

        let target = manifest.display().to_string();
        log_status!("apply", "Applying {}", target);
        let pending = report.new_result(&target, Backend::Kubectl);
        let output = executor.apply_manifest(manifest, cancel);

        let result = if output.success {
            pending.pass()
        } else {
            pending.fail(format!(
                "failed to apply yaml {}. error: {}",
                target,
                output.stderr.trim_end()
            ))
        };
        report.add_result(result);

        if output.cancelled {
            return Err(Error::run_cancelled("apply", report.len()));
        }
    }
    Ok(())
}

fn run_scripts(
    ctx: &ExecutionContext,
    report: &mut Report,
    executor: &impl Executor,
    tools: &ToolsConfig,
    cancel: &CancelToken,
) -> Result<()> {
    for script in &ctx.script_artifacts {
        let content = read_script(script)?;
        let source = script.display().to_string();

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some(backend) = classify_line(line, tools) else {
                continue;
            };
            if !ctx.allows(backend) {
                continue;
            }

            check_cancelled(cancel, "script", report)?;

            let pending = report.new_result(line, backend).with_source(&source);
            let cancelled = match backend {
                Backend::Kubectl => {
                    log_status!("run", "{}", line);
                    let output = executor.run_local(line, cancel);
                    report.add_result(complete(pending, &output, None));
                    output.cancelled
                }
                Backend::Pxctl => match ctx.remote_host.as_deref() {
                    Some(host) => {
                        log_status!("run", "{} (on {})", line, host);
                        let output = executor.run_remote(host, line, cancel);
                        report.add_result(complete(pending, &output, Some(host)));
                        output.cancelled
                    }
                    None => {
                        report.add_result(pending.fail("no remote host configured"));
                        false
                    }
                },
            };

            if cancelled {
                return Err(Error::run_cancelled("script", report.len()));
            }
        }
    }
    Ok(())
}

/// Documents without a yaml fence leave an empty manifest behind.
fn is_empty_artifact(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.len() == 0)
}

fn read_script(path: &Path) -> Result<String> {
    io::read_file(path, &format!("read script artifact {}", path.display()))
}

fn check_cancelled(cancel: &CancelToken, phase: &str, report: &Report) -> Result<()> {
    if cancel.is_cancelled() {
        log_status!("run", "Cancelled during {} after {} results", phase, report.len());
        return Err(Error::run_cancelled(phase, report.len()));
    }
    Ok(())
}

fn complete(
    pending: PendingResult,
    output: &CommandOutput,
    host: Option<&str>,
) -> CommandResult {
    if output.success {
        return pending.pass();
    }
    match host {
        Some(host) if ssh::is_connection_error(output) => pending.fail(format!(
            "ssh connection to {} failed: {}",
            host,
            output.stderr.trim_end()
        )),
        _ => pending.fail(output.combined().trim_end().to_string()),
    }
}
