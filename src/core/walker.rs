//! Document discovery and snippet extraction.
//!
//! `walk` accepts a single markdown file or a directory tree. Every
//! document visited gets its own artifact pair; the paths are appended to
//! the `ExecutionContext` in traversal order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact;
use crate::cancel::CancelToken;
use crate::context::ExecutionContext;
use crate::error::{Error, ErrorCode, Result};
use crate::io;
use crate::markdown;
use crate::snippet::{self, SnippetKind};

/// Walk `path`, writing artifacts for every markdown document found.
///
/// In single-file mode any failure is returned. In directory mode a failing
/// document is logged, recorded in `ctx.skipped`, and traversal continues.
pub fn walk(path: &Path, ctx: &mut ExecutionContext, cancel: &CancelToken) -> Result<()> {
    let meta = fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::docs_path_not_found(path.display().to_string())
        } else {
            Error::internal_io(e.to_string(), Some(format!("stat {}", path.display())))
        }
    })?;

    if meta.is_dir() {
        walk_directory(path, ctx, cancel)
    } else {
        walk_file(path, ctx)
    }
}

/// Extract one document's snippets into a fresh artifact pair.
pub fn walk_file(path: &Path, ctx: &mut ExecutionContext) -> Result<()> {
    if !ctx.is_markdown(path) {
        return Err(Error::docs_not_markdown(
            path.display().to_string(),
            path.extension().map(|e| e.to_string_lossy().to_string()),
        ));
    }

    log_status!("extract", "Parsing {}", path.display());
    let body = io::read_file(path, &format!("read {}", path.display()))?;
    let tokens = markdown::tokenize(&body);

    let base_name = ctx.claim_base_name(path);
    let mut files = artifact::create_artifacts(&ctx.artifact_root, &base_name)?;

    for token in &tokens {
        let snippet = snippet::classify(token);
        if snippet.is_empty() {
            continue;
        }
        match snippet.kind() {
            SnippetKind::Yaml => files.write_yaml(&snippet.content)?,
            SnippetKind::Bash => files.write_bash(&snippet.content)?,
            SnippetKind::Other => {
                log_status!(
                    "extract",
                    "Non executable snippet ({}) in {}",
                    snippet.lang,
                    path.display()
                );
            }
        }
    }

    let doc = files.finish(path)?;
    ctx.record_document(doc);
    Ok(())
}

fn walk_directory(dir: &Path, ctx: &mut ExecutionContext, cancel: &CancelToken) -> Result<()> {
    log_status!("extract", "Scanning {}", dir.display());

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read {}", dir.display()))))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if cancel.is_cancelled() {
            return Err(Error::run_cancelled("walk", 0));
        }

        if path.is_dir() {
            if ctx.is_artifact_path(&path) {
                log_status!("extract", "Skipping artifact directory {}", path.display());
                continue;
            }
            if let Err(err) = walk_directory(&path, ctx, cancel) {
                if err.code == ErrorCode::RunCancelled {
                    return Err(err);
                }
                log_status!("extract", "Skipping {}: {}", path.display(), err.message);
                ctx.record_skipped(&path, &err);
            }
        } else if path.is_file() && ctx.is_markdown(&path) {
            if let Err(err) = walk_file(&path, ctx) {
                log_status!("extract", "Skipping {}: {}", path.display(), err.message);
                ctx.record_skipped(&path, &err);
            }
        }
    }

    Ok(())
}
