// Command execution seam - local shell for cluster commands, SSH for node commands

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::{DocvalConfig, RemoteConfig, ToolsConfig};
use crate::process::{self, CommandOutput, RunLimits};
use crate::ssh::SshClient;

/// Everything the dispatcher needs to run extracted snippets.
///
/// `SystemExecutor` spawns real processes; tests substitute a recorder.
pub trait Executor {
    /// `<kubectl> apply -f <manifest>`
    fn apply_manifest(&self, manifest: &Path, cancel: &CancelToken) -> CommandOutput;

    /// Run one script line through the local shell.
    fn run_local(&self, line: &str, cancel: &CancelToken) -> CommandOutput;

    /// Run one script line on `host` over a fresh SSH session.
    fn run_remote(&self, host: &str, line: &str, cancel: &CancelToken) -> CommandOutput;
}

pub struct SystemExecutor {
    tools: ToolsConfig,
    remote: RemoteConfig,
    env: Vec<(String, String)>,
    command_timeout: Option<Duration>,
    remote_timeout: Option<Duration>,
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl SystemExecutor {
    pub fn new(config: &DocvalConfig) -> Self {
        Self {
            tools: config.tools.clone(),
            remote: config.remote.clone(),
            env: Vec::new(),
            command_timeout: timeout_from_secs(config.execution.command_timeout_secs),
            remote_timeout: timeout_from_secs(config.execution.remote_timeout_secs),
        }
    }

    /// Point local cluster commands at a specific kubeconfig.
    pub fn with_kubeconfig(mut self, kubeconfig: Option<&str>) -> Self {
        if let Some(path) = kubeconfig.filter(|p| !p.is_empty()) {
            self.env.push((
                "KUBECONFIG".to_string(),
                shellexpand::tilde(path).to_string(),
            ));
        }
        self
    }

    fn local_limits<'a>(&self, cancel: &'a CancelToken) -> RunLimits<'a> {
        RunLimits {
            timeout: self.command_timeout,
            cancel,
        }
    }
}

impl Executor for SystemExecutor {
    fn apply_manifest(&self, manifest: &Path, cancel: &CancelToken) -> CommandOutput {
        let mut cmd = Command::new(&self.tools.kubectl);
        cmd.arg("apply").arg("-f").arg(manifest);
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        process::run(cmd, self.local_limits(cancel))
    }

    fn run_local(&self, line: &str, cancel: &CancelToken) -> CommandOutput {
        process::run_shell(line, &self.env, self.local_limits(cancel))
    }

    fn run_remote(&self, host: &str, line: &str, cancel: &CancelToken) -> CommandOutput {
        let client = match SshClient::from_config(host, &self.remote) {
            Ok(client) => client,
            Err(err) => return CommandOutput::spawn_failed(err.message),
        };
        client.execute(
            line,
            RunLimits {
                timeout: self.remote_timeout,
                cancel,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_means_unbounded() {
        assert_eq!(timeout_from_secs(0), None);
        assert_eq!(timeout_from_secs(5), Some(Duration::from_secs(5)));
    }

    #[test]
    fn kubeconfig_is_exported_to_children() {
        let executor = SystemExecutor::new(&DocvalConfig::default()).with_kubeconfig(Some("/tmp/kc"));
        assert_eq!(
            executor.env,
            vec![("KUBECONFIG".to_string(), "/tmp/kc".to_string())]
        );

        let bare = SystemExecutor::new(&DocvalConfig::default()).with_kubeconfig(Some(""));
        assert!(bare.env.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn local_lines_see_kubeconfig() {
        let executor = SystemExecutor::new(&DocvalConfig::default()).with_kubeconfig(Some("/tmp/kc"));
        let out = executor.run_local("echo $KUBECONFIG", &CancelToken::new());
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "/tmp/kc");
    }

    #[test]
    fn missing_identity_file_fails_the_command() {
        let mut config = DocvalConfig::default();
        config.remote.identity_file = Some("/nonexistent/key".to_string());
        let executor = SystemExecutor::new(&config);

        let out = executor.run_remote("node1", "pxctl status", &CancelToken::new());
        assert!(!out.success);
        assert!(out.stderr.contains("identity file not found"));
    }
}
