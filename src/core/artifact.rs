//! Per-document artifact files.
//!
//! Each source document gets two files in the run's artifact directory:
//! `<base>-manifest.yaml` holding every `yaml` fence as its own YAML
//! document, and `<base>-commands.sh` holding every `bash` fence.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

pub const MANIFEST_SUFFIX: &str = "-manifest.yaml";
pub const COMMANDS_SUFFIX: &str = "-commands.sh";
pub const YAML_SEPARATOR: &str = "---\n";

/// Open artifact files for one document. Dropping closes both files.
pub struct ArtifactFiles {
    yaml: BufWriter<File>,
    commands: BufWriter<File>,
    yaml_path: PathBuf,
    commands_path: PathBuf,
    yaml_blocks: usize,
    bash_blocks: usize,
}

/// Artifacts produced for one source document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentArtifacts {
    pub source: String,
    pub manifest: String,
    pub commands: String,
    pub yaml_blocks: usize,
    pub bash_blocks: usize,
}

pub fn manifest_path(artifact_root: &Path, base_name: &str) -> PathBuf {
    artifact_root.join(format!("{}{}", base_name, MANIFEST_SUFFIX))
}

pub fn commands_path(artifact_root: &Path, base_name: &str) -> PathBuf {
    artifact_root.join(format!("{}{}", base_name, COMMANDS_SUFFIX))
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    File::create(path).map(BufWriter::new).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", path.display())))
    })
}

/// Create the artifact pair for `base_name`, creating `artifact_root` if needed.
///
/// Existing files are truncated so re-running over the same input yields
/// the same content.
pub fn create_artifacts(artifact_root: &Path, base_name: &str) -> Result<ArtifactFiles> {
    fs::create_dir_all(artifact_root).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("create {}", artifact_root.display())),
        )
    })?;

    let yaml_path = manifest_path(artifact_root, base_name);
    let commands_path = commands_path(artifact_root, base_name);
    let yaml = create_file(&yaml_path)?;
    let commands = create_file(&commands_path)?;

    Ok(ArtifactFiles {
        yaml,
        commands,
        yaml_path,
        commands_path,
        yaml_blocks: 0,
        bash_blocks: 0,
    })
}

impl ArtifactFiles {
    pub fn yaml_path(&self) -> &Path {
        &self.yaml_path
    }

    pub fn commands_path(&self) -> &Path {
        &self.commands_path
    }

    /// Append one YAML fence as a new document in the manifest stream.
    pub fn write_yaml(&mut self, content: &str) -> Result<()> {
        write!(self.yaml, "{}{}", YAML_SEPARATOR, content).map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("write {}", self.yaml_path.display())),
            )
        })?;
        self.yaml_blocks += 1;
        Ok(())
    }

    /// Append one bash fence to the command script.
    pub fn write_bash(&mut self, content: &str) -> Result<()> {
        write!(self.commands, "\n{}", content).map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("write {}", self.commands_path.display())),
            )
        })?;
        self.bash_blocks += 1;
        Ok(())
    }

    /// Flush both files and describe what was written.
    pub fn finish(mut self, source: &Path) -> Result<DocumentArtifacts> {
        self.yaml.flush().map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("flush {}", self.yaml_path.display())),
            )
        })?;
        self.commands.flush().map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("flush {}", self.commands_path.display())),
            )
        })?;

        Ok(DocumentArtifacts {
            source: source.display().to_string(),
            manifest: self.yaml_path.display().to_string(),
            commands: self.commands_path.display().to_string(),
            yaml_blocks: self.yaml_blocks,
            bash_blocks: self.bash_blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_directory_and_named_pair() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("artifacts").join("nested");

        let files = create_artifacts(&root, "install").unwrap();
        assert_eq!(files.yaml_path(), root.join("install-manifest.yaml"));
        assert_eq!(files.commands_path(), root.join("install-commands.sh"));
        assert!(root.join("install-manifest.yaml").is_file());
        assert!(root.join("install-commands.sh").is_file());
    }

    #[test]
    fn yaml_blocks_become_separate_documents() {
        let dir = TempDir::new().unwrap();
        let mut files = create_artifacts(dir.path(), "doc").unwrap();
        files.write_yaml("kind: Pod\n").unwrap();
        files.write_yaml("kind: Service\n").unwrap();
        let summary = files.finish(Path::new("doc.md")).unwrap();

        let written = fs::read_to_string(&summary.manifest).unwrap();
        assert_eq!(written, "---\nkind: Pod\n---\nkind: Service\n");
        assert_eq!(summary.yaml_blocks, 2);

        let docs: Vec<serde_yml::Value> = serde_yml::Deserializer::from_str(&written)
            .map(|d| <serde_yml::Value as serde::Deserialize>::deserialize(d).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn bash_blocks_are_newline_joined() {
        let dir = TempDir::new().unwrap();
        let mut files = create_artifacts(dir.path(), "doc").unwrap();
        files.write_bash("kubectl get pods\n").unwrap();
        files.write_bash("pxctl status\n").unwrap();
        let summary = files.finish(Path::new("doc.md")).unwrap();

        let written = fs::read_to_string(&summary.commands).unwrap();
        assert_eq!(written, "\nkubectl get pods\n\npxctl status\n");
        assert_eq!(summary.bash_blocks, 2);
    }

    #[test]
    fn recreating_truncates_previous_content() {
        let dir = TempDir::new().unwrap();
        let mut first = create_artifacts(dir.path(), "doc").unwrap();
        first.write_yaml("a: 1\n").unwrap();
        first.finish(Path::new("doc.md")).unwrap();

        let second = create_artifacts(dir.path(), "doc").unwrap();
        let summary = second.finish(Path::new("doc.md")).unwrap();
        assert_eq!(fs::read_to_string(summary.manifest).unwrap(), "");
    }

    #[test]
    fn unwritable_root_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("artifacts");
        fs::write(&blocker, "not a directory").unwrap();

        let err = create_artifacts(&blocker, "doc").err().unwrap();
        assert_eq!(err.code.as_str(), "internal.io_error");
    }
}
