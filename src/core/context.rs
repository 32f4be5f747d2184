//! Run-scoped execution context shared by the walker and the dispatcher.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::artifact::DocumentArtifacts;
use crate::config::DocsConfig;
use crate::dispatch::Backend;
use crate::error::{Error, Result};

/// A document the walker could not turn into artifacts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedDocument {
    pub path: String,
    pub code: String,
    pub message: String,
}

/// One per run. The walker appends artifacts; the dispatcher only reads.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Restrict execution to one backend (`None` runs both)
    pub target_filter: Option<Backend>,
    pub remote_host: Option<String>,
    pub artifact_root: PathBuf,
    pub artifact_dir_name: String,
    pub markdown_extension: String,
    pub yaml_artifacts: Vec<PathBuf>,
    pub script_artifacts: Vec<PathBuf>,
    pub documents: Vec<DocumentArtifacts>,
    pub skipped: Vec<SkippedDocument>,
    walk_root: PathBuf,
    used_base_names: HashSet<String>,
}

impl ExecutionContext {
    /// Build the context for `input`, a markdown file or a directory of them.
    ///
    /// Artifacts go under `<input-root>/<artifact_dir>`, where the input root
    /// is the directory itself or the file's parent.
    pub fn for_input(input: &Path, docs: &DocsConfig) -> Result<Self> {
        let meta = fs::metadata(input).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::docs_path_not_found(input.display().to_string())
            } else {
                Error::internal_io(e.to_string(), Some(format!("stat {}", input.display())))
            }
        })?;

        let walk_root = if meta.is_dir() {
            input.to_path_buf()
        } else {
            match input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        };

        Ok(Self {
            target_filter: None,
            remote_host: None,
            artifact_root: walk_root.join(&docs.artifact_dir),
            artifact_dir_name: docs.artifact_dir.clone(),
            markdown_extension: docs.markdown_extension.clone(),
            yaml_artifacts: Vec::new(),
            script_artifacts: Vec::new(),
            documents: Vec::new(),
            skipped: Vec::new(),
            walk_root,
            used_base_names: HashSet::new(),
        })
    }

    pub fn with_remote_host(mut self, host: Option<String>) -> Self {
        self.remote_host = host.filter(|h| !h.trim().is_empty());
        self
    }

    pub fn with_target_filter(mut self, filter: Option<Backend>) -> Self {
        self.target_filter = filter;
        self
    }

    pub fn walk_root(&self) -> &Path {
        &self.walk_root
    }

    /// Whether commands for `backend` should run in this context.
    pub fn allows(&self, backend: Backend) -> bool {
        self.target_filter.is_none_or(|only| only == backend)
    }

    pub fn is_markdown(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.to_string_lossy() == self.markdown_extension)
    }

    /// Directories whose path below the walk root mentions the artifact
    /// directory hold generated output, not input.
    pub fn is_artifact_path(&self, dir: &Path) -> bool {
        let relative = dir.strip_prefix(&self.walk_root).unwrap_or(dir);
        relative
            .to_string_lossy()
            .contains(self.artifact_dir_name.as_str())
    }

    /// Reserve an artifact base name for `doc`, unique within this run.
    ///
    /// Top-level documents use their file stem; nested ones are prefixed
    /// with their directories (`guides/install.md` -> `guides-install`).
    pub fn claim_base_name(&mut self, doc: &Path) -> String {
        let relative = doc.strip_prefix(&self.walk_root).unwrap_or(doc);
        let mut parts: Vec<String> = relative
            .parent()
            .map(|p| {
                p.components()
                    .filter_map(|c| match c {
                        Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let stem = doc
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "doc".to_string());
        parts.push(stem);

        let base = parts.join("-");
        let mut candidate = base.clone();
        let mut n = 2;
        while !self.used_base_names.insert(candidate.clone()) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        candidate
    }

    pub fn record_document(&mut self, doc: DocumentArtifacts) {
        self.yaml_artifacts.push(PathBuf::from(&doc.manifest));
        self.script_artifacts.push(PathBuf::from(&doc.commands));
        self.documents.push(doc);
    }

    pub fn record_skipped(&mut self, path: &Path, err: &Error) {
        self.skipped.push(SkippedDocument {
            path: path.display().to_string(),
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
        });
    }
}
