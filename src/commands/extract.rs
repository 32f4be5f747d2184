use clap::Args;
use serde::Serialize;
use std::path::Path;

use docval::artifact::DocumentArtifacts;
use docval::cancel::CancelToken;
use docval::config::DocsConfig;
use docval::context::{ExecutionContext, SkippedDocument};
use docval::log_status;
use docval::walker;

use super::CmdResult;

#[derive(Args)]
pub struct ExtractArgs {
    /// Markdown file or directory of markdown files
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOutput {
    command: String,
    input: String,
    artifact_root: String,
    documents: Vec<DocumentArtifacts>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<SkippedDocument>,
}

pub fn run(args: ExtractArgs, global: &crate::commands::GlobalArgs) -> CmdResult<ExtractOutput> {
    let config = docval::config::load(global.config.as_deref())?;
    let ctx = walk_input(&args.path, &config.docs, &CancelToken::new())?;

    Ok((
        ExtractOutput {
            command: "extract".to_string(),
            input: args.path,
            artifact_root: ctx.artifact_root.display().to_string(),
            documents: ctx.documents,
            skipped: ctx.skipped,
        },
        0,
    ))
}

/// Build a context for `path` and fill it by walking the input.
pub(crate) fn walk_input(
    path: &str,
    docs: &DocsConfig,
    cancel: &CancelToken,
) -> docval::Result<ExecutionContext> {
    if path.trim().is_empty() {
        return Err(docval::Error::validation_missing_argument(vec![
            "path".to_string(),
        ]));
    }

    let input = Path::new(path);
    let mut ctx = ExecutionContext::for_input(input, docs)?;
    walker::walk(input, &mut ctx, cancel)?;

    log_status!(
        "extract",
        "{} documents extracted into {}",
        ctx.documents.len(),
        ctx.artifact_root.display()
    );
    Ok(ctx)
}
