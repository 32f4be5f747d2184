use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::paths;
use crate::ssh::HostKeyPolicy;

/// Root configuration structure for docval.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocvalConfig {
    #[serde(default = "default_tools")]
    pub tools: ToolsConfig,

    #[serde(default = "default_remote")]
    pub remote: RemoteConfig,

    #[serde(default = "default_execution")]
    pub execution: ExecutionConfig,

    #[serde(default = "default_docs")]
    pub docs: DocsConfig,
}

impl Default for DocvalConfig {
    fn default() -> Self {
        Self {
            tools: default_tools(),
            remote: default_remote(),
            execution: default_execution(),
            docs: default_docs(),
        }
    }
}

/// Leading command tokens that select an execution backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Cluster CLI, run locally (also used for `apply -f` on manifests)
    #[serde(default = "default_kubectl")]
    pub kubectl: String,

    /// Storage CLI, run on the remote node over SSH
    #[serde(default = "default_pxctl")]
    pub pxctl: String,
}

/// How to reach the remote node for `pxctl` commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Node address; usually supplied per run with --remote-host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Password auth goes through `sshpass`; omit to use keys/agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,

    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Attempts for transient connection failures (refused, unreachable)
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Deadline for each local command and manifest apply
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Deadline for each remote command, connection included
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    /// Directory created under the input root to hold generated artifacts
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Extension (without dot) identifying markdown documents
    #[serde(default = "default_markdown_extension")]
    pub markdown_extension: String,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_tools() -> ToolsConfig {
    ToolsConfig {
        kubectl: default_kubectl(),
        pxctl: default_pxctl(),
    }
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_pxctl() -> String {
    "pxctl".to_string()
}

fn default_remote() -> RemoteConfig {
    RemoteConfig {
        host: None,
        user: default_user(),
        port: default_ssh_port(),
        password: None,
        identity_file: None,
        host_key_policy: HostKeyPolicy::default(),
        connect_timeout_secs: default_connect_timeout_secs(),
        connect_attempts: default_connect_attempts(),
    }
}

fn default_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_execution() -> ExecutionConfig {
    ExecutionConfig {
        command_timeout_secs: default_command_timeout_secs(),
        remote_timeout_secs: default_remote_timeout_secs(),
    }
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_remote_timeout_secs() -> u64 {
    300
}

fn default_docs() -> DocsConfig {
    DocsConfig {
        artifact_dir: default_artifact_dir(),
        markdown_extension: default_markdown_extension(),
    }
}

fn default_artifact_dir() -> String {
    "artifacts".to_string()
}

fn default_markdown_extension() -> String {
    "md".to_string()
}

// =============================================================================
// Loading functions
// =============================================================================

/// Resolve the config file location: explicit path (tilde-expanded) or the
/// global docval.json.
pub fn config_path(explicit: Option<&str>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(PathBuf::from(shellexpand::tilde(path).to_string())),
        None => paths::docval_json(),
    }
}

/// Load configuration, merging file values over built-in defaults.
///
/// A missing global file yields the defaults; a missing explicit file or
/// unparseable JSON is an error.
pub fn load(explicit: Option<&str>) -> Result<DocvalConfig> {
    let path = config_path(explicit)?;

    if !path.exists() {
        if explicit.is_some() {
            return Err(Error::config_invalid_value(
                "config",
                Some(path.display().to_string()),
                "Config file does not exist",
            ));
        }
        return Ok(DocvalConfig::default());
    }

    load_from_file(&path)
}

fn load_from_file(path: &Path) -> Result<DocvalConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    let config: DocvalConfig = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;

    config.validate()?;
    Ok(config)
}

impl DocvalConfig {
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("tools.kubectl", &self.tools.kubectl),
            ("tools.pxctl", &self.tools.pxctl),
        ] {
            if value.trim().is_empty() || value.contains(char::is_whitespace) {
                return Err(Error::config_invalid_value(
                    key,
                    Some(value.clone()),
                    "Tool name must be a single non-empty word",
                ));
            }
        }

        if self.tools.kubectl == self.tools.pxctl {
            return Err(Error::config_invalid_value(
                "tools.pxctl",
                Some(self.tools.pxctl.clone()),
                "Local and remote tool names must differ",
            ));
        }

        let artifact_dir = self.docs.artifact_dir.trim();
        if artifact_dir.is_empty() || artifact_dir.contains(|c: char| c == '/' || c == '\\') {
            return Err(Error::config_invalid_value(
                "docs.artifact_dir",
                Some(self.docs.artifact_dir.clone()),
                "Artifact directory must be a plain directory name",
            ));
        }

        if self.remote.connect_attempts == 0 {
            return Err(Error::config_invalid_value(
                "remote.connect_attempts",
                Some("0".to_string()),
                "At least one connection attempt is required",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docval.json");
        fs::write(
            &path,
            r#"{"remote": {"user": "admin", "host_key_policy": "insecure"}}"#,
        )
        .unwrap();

        let config = load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.remote.user, "admin");
        assert_eq!(config.remote.port, 22);
        assert_eq!(config.remote.host_key_policy, HostKeyPolicy::Insecure);
        assert_eq!(config.tools.kubectl, "kubectl");
        assert_eq!(config.docs.artifact_dir, "artifacts");
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docval.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load(Some(path.to_str().unwrap())).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        let err = load(Some(path.to_str().unwrap())).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn identical_tool_names_are_rejected() {
        let mut config = DocvalConfig::default();
        config.tools.pxctl = "kubectl".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn nested_artifact_dir_is_rejected() {
        let mut config = DocvalConfig::default();
        config.docs.artifact_dir = "out/artifacts".to_string();
        assert!(config.validate().is_err());
    }
}
